//! Known wikis: name, base URL and search query template.
//!
//! A built-in list is always available. Users can add or override entries
//! with a `wikis.yaml` file in the config directory:
//!
//! ```yaml
//! wikis:
//!   - name: voidwiki
//!     url: https://docs.voidlinux.org
//!     searchstring: /?search=
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::cache::directory::default_config_dir;

/// File name looked up in the config directory.
pub const WIKIS_FILE_NAME: &str = "wikis.yaml";

/// A wiki the proxy can front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wiki {
    pub name: String,
    pub url: String,
    /// Path and query prefix the url-encoded search terms are appended to.
    pub searchstring: String,
}

impl Wiki {
    fn new(name: &str, url: &str, searchstring: &str) -> Self {
        Self { name: name.into(), url: url.into(), searchstring: searchstring.into() }
    }
}

#[derive(Debug, Deserialize)]
struct WikisFile {
    #[serde(default)]
    wikis: Vec<Wiki>,
}

/// Registry of known wikis, keyed by name.
#[derive(Debug, Clone)]
pub struct Wikis {
    wikis: BTreeMap<String, Wiki>,
    sources: Vec<PathBuf>,
}

impl Default for Wikis {
    fn default() -> Self {
        let wikis = builtin()
            .into_iter()
            .map(|w| (w.name.clone(), w))
            .collect();
        Self { wikis, sources: Vec::new() }
    }
}

fn builtin() -> Vec<Wiki> {
    vec![
        Wiki::new("archwiki", "https://wiki.archlinux.org", "/index.php?search="),
        Wiki::new("wikipedia", "https://en.wikipedia.org", "/w/index.php?search="),
        Wiki::new("freebsd", "https://wiki.freebsd.org", "/FrontPage?action=fullsearch&value="),
        Wiki::new("gentoo", "https://wiki.gentoo.org", "/index.php?search="),
        Wiki::new("debian", "https://wiki.debian.org", "/FrontPage?action=fullsearch&value="),
        Wiki::new("nixos", "https://wiki.nixos.org", "/w/index.php?search="),
    ]
}

impl Wikis {
    /// Built-ins merged with `wikis.yaml` from the platform config directory.
    pub fn load() -> Self {
        Self::load_from(&[default_config_dir().join(WIKIS_FILE_NAME)])
    }

    /// Built-ins merged with each readable file in `paths`, later files winning.
    ///
    /// Unreadable or malformed files are skipped with a log line.
    pub fn load_from(paths: &[PathBuf]) -> Self {
        let mut registry = Self::default();
        for path in paths {
            if !path.is_file() {
                tracing::debug!(path = %path.display(), "no known wikis file");
                continue;
            }
            match read_file(path) {
                Ok(wikis) => {
                    tracing::debug!(path = %path.display(), count = wikis.len(), "loaded known wikis");
                    for wiki in wikis {
                        registry.wikis.insert(wiki.name.clone(), wiki);
                    }
                    registry.sources.push(path.clone());
                }
                Err(e) => tracing::warn!(path = %path.display(), "could not load known wikis file: {e}"),
            }
        }
        registry
    }

    /// Look up a wiki by name.
    pub fn get(&self, name: &str) -> Result<&Wiki, Error> {
        self.wikis.get(name).ok_or_else(|| {
            Error::UnknownWiki(format!("{name} (known: {})", self.names().join(", ")))
        })
    }

    /// Sorted wiki names.
    pub fn names(&self) -> Vec<&str> {
        self.wikis.keys().map(String::as_str).collect()
    }

    /// Files that contributed entries.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Listing for `--help` style output.
    pub fn help_string(&self) -> String {
        let mut s = format!(
            "Known wikis are read from {WIKIS_FILE_NAME} in {}\nThe currently known wikis are:\n",
            default_config_dir().display()
        );
        for wiki in self.wikis.values() {
            s.push_str(&format!("- {}: {}\n", wiki.name, wiki.url));
        }
        s
    }
}

fn read_file(path: &Path) -> Result<Vec<Wiki>, figment::Error> {
    let file: WikisFile = Figment::from(Yaml::file(path)).extract()?;
    Ok(file.wikis)
}
