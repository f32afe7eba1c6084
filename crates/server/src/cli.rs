//! Command line interface.

use clap::{ArgAction, Parser};
use wikisearch_client::FetchPolicy;
use wikisearch_core::{AppConfig, ConversionMode, Wiki};

#[derive(Parser, Debug)]
#[command(
    name = "arch-wiki-search",
    version,
    disable_version_flag = true,
    about = "Read and search wikis through a local caching proxy",
    after_help = "Known wikis are listed with --wiki help. Settings can also come from WIKI_SEARCH_* variables."
)]
pub struct Cli {
    /// Search terms. The wiki front page when empty.
    pub search: Vec<String>,

    /// Conversion applied to pages: raw, clean-html or text.
    #[arg(short, long, value_name = "MODE")]
    pub conv: Option<ConversionMode>,

    /// Known wiki to search.
    #[arg(short, long, value_name = "NAME")]
    pub wiki: Option<String>,

    /// Base URL, overriding the wiki's.
    #[arg(short, long)]
    pub url: Option<String>,

    /// Search path template the terms are appended to, overriding the wiki's.
    #[arg(short, long, value_name = "TEMPLATE")]
    pub searchstring: Option<String>,

    /// Browser command to open instead of the default one.
    #[arg(short, long, value_name = "CMD", conflicts_with = "no_browser")]
    pub browser: Option<String>,

    /// Print the proxy URL instead of opening a browser.
    #[arg(long)]
    pub no_browser: bool,

    /// Serve from the cache only, even expired pages.
    #[arg(long, conflicts_with = "refresh")]
    pub offline: bool,

    /// Refetch every page, ignoring fresh cache entries.
    #[arg(long)]
    pub refresh: bool,

    /// Verbose logs and error details in failure pages.
    #[arg(short, long)]
    pub debug: bool,

    /// Local port for the proxy.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Delete every cached page and exit.
    #[arg(long)]
    pub clear_cache: bool,

    /// Print version.
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: (),
}

impl Cli {
    /// Apply flags over the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(conv) = self.conv {
            config.conversion = conv;
        }
        if let Some(wiki) = &self.wiki {
            config.wiki = wiki.clone();
        }
    }

    pub fn policy(&self) -> FetchPolicy {
        if self.offline {
            FetchPolicy::Offline
        } else if self.refresh {
            FetchPolicy::Refresh
        } else {
            FetchPolicy::Normal
        }
    }

    pub fn search_terms(&self) -> String {
        self.search.join(" ").trim().to_string()
    }

    /// Origin base URL and search path for `wiki` with the overrides applied.
    pub fn target(&self, wiki: &Wiki) -> (String, String) {
        let base = self.url.clone().unwrap_or_else(|| wiki.url.clone());
        let template = self.searchstring.as_deref().unwrap_or(&wiki.searchstring);
        (base, search_path(template, &self.search_terms()))
    }
}

/// Path under the origin for a search. Empty terms give the front page.
pub fn search_path(template: &str, terms: &str) -> String {
    if terms.is_empty() {
        return String::new();
    }
    let encoded: String = url::form_urlencoded::byte_serialize(terms.as_bytes()).collect();
    format!("{}{encoded}", template.trim_start_matches('/'))
}
