//! Immutable per-run settings shared by every proxy component.

use std::path::PathBuf;
use std::time::Duration;

use wikisearch_core::{AppConfig, ConversionMode};

use crate::fetch::{FetchConfig, FetchPolicy, OriginBase};

/// Everything a proxy session needs, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub origin: OriginBase,
    pub port: u16,
    pub mode: ConversionMode,
    pub cache_dir: PathBuf,
    pub ttl: chrono::Duration,
    pub policy: FetchPolicy,
    pub debug: bool,
    pub prefetch_concurrency: usize,
    pub user_agent: String,
    pub timeout: Duration,
}

impl SessionConfig {
    /// Session with the loaded application defaults for `origin`.
    pub fn from_app(app: &AppConfig, origin: OriginBase) -> Self {
        Self {
            origin,
            port: app.port,
            mode: app.conversion,
            cache_dir: app.cache_dir(),
            ttl: app.ttl(),
            policy: FetchPolicy::Normal,
            debug: false,
            prefetch_concurrency: app.prefetch_concurrency,
            user_agent: app.user_agent.clone(),
            timeout: app.timeout(),
        }
    }

    /// Base URL the browser talks to.
    pub fn local_base(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Browser URL for a path on the origin.
    pub fn local_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.local_base(), self.origin, path.trim_start_matches('/'))
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig { user_agent: self.user_agent.clone(), timeout: self.timeout }
    }

    /// Background prefetching needs the network.
    pub fn prefetch_enabled(&self) -> bool {
        self.policy != FetchPolicy::Offline
    }
}
