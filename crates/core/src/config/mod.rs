//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (WIKI_SEARCH_*)
//! 2. TOML config file (WIKI_SEARCH_CONFIG_FILE, else `config.toml` in the
//!    platform config directory when present)
//! 3. Built-in defaults
//!
//! Command line flags are applied on top by the binary.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::directory::{default_cache_dir, default_config_dir};

mod validation;

pub use validation::ConfigError;

/// How proxied pages are rewritten before reaching the browser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionMode {
    /// Links rewritten, everything else untouched.
    #[default]
    Raw,
    /// Scripts, styles and frames removed.
    #[serde(alias = "clean")]
    CleanHtml,
    /// Visible text only, served as text/plain.
    #[serde(alias = "txt")]
    Text,
}

impl FromStr for ConversionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "clean-html" | "clean" => Ok(Self::CleanHtml),
            "text" | "txt" => Ok(Self::Text),
            other => Err(ConfigError::Invalid {
                field: "conversion".into(),
                reason: format!("unknown mode '{other}' (expected raw, clean-html or text)"),
            }),
        }
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raw => "raw",
            Self::CleanHtml => "clean-html",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (WIKI_SEARCH_*)
/// 2. TOML config file
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the response cache.
    ///
    /// Set via WIKI_SEARCH_CACHE_DIR. Defaults to the platform cache location.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Local port the proxy listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Days before a cached page is refetched.
    #[serde(default = "default_expire_days")]
    pub expire_days: u32,

    /// User-Agent string for upstream requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upstream request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of background prefetches running at once.
    #[serde(default = "default_prefetch_concurrency")]
    pub prefetch_concurrency: usize,

    /// Known wiki used when none is given on the command line.
    #[serde(default = "default_wiki")]
    pub wiki: String,

    /// Conversion applied to proxied pages.
    #[serde(default)]
    pub conversion: ConversionMode,
}

fn default_port() -> u16 {
    8888
}

fn default_expire_days() -> u32 {
    30
}

fn default_user_agent() -> String {
    concat!("arch-wiki-search/", env!("CARGO_PKG_VERSION")).into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_prefetch_concurrency() -> usize {
    4
}

fn default_wiki() -> String {
    "archwiki".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            port: default_port(),
            expire_days: default_expire_days(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            prefetch_concurrency: default_prefetch_concurrency(),
            wiki: default_wiki(),
            conversion: ConversionMode::Raw,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Cache lifetime of a stored page.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.expire_days))
    }

    /// Configured cache directory or the platform default.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("WIKI_SEARCH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        } else {
            let default_file = default_config_dir().join("config.toml");
            if default_file.is_file() {
                figment = figment.merge(Toml::file(default_file));
            }
        }

        figment = figment.merge(
            Env::prefixed("WIKI_SEARCH_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
