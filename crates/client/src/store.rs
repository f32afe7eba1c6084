//! Content store: cached-or-live responses for paths under the origin.
//!
//! Only 200, 301 and 308 responses are persisted. Everything else is fetched
//! live on every request. Concurrent requests for the same uncached path are
//! not coalesced; each one reaches the origin.

use std::sync::Arc;

use chrono::Utc;
use reqwest::StatusCode;
use wikisearch_core::cache::{directory, hash::compute_cache_key};
use wikisearch_core::{CacheDb, Error};

use crate::fetch::{FetchPolicy, Origin, OriginBase, Response, error_page};
use crate::session::SessionConfig;

/// Status codes eligible for persistent caching.
pub const ADMITTED_STATUSES: [StatusCode; 3] =
    [StatusCode::OK, StatusCode::MOVED_PERMANENTLY, StatusCode::PERMANENT_REDIRECT];

pub fn is_admitted(status: StatusCode) -> bool {
    ADMITTED_STATUSES.contains(&status)
}

/// Cache-backed access to the origin.
#[derive(Clone)]
pub struct ContentStore {
    db: CacheDb,
    origin: Arc<dyn Origin>,
    base: OriginBase,
    ttl: chrono::Duration,
    debug: bool,
}

impl ContentStore {
    pub fn new(db: CacheDb, origin: Arc<dyn Origin>, base: OriginBase, ttl: chrono::Duration, debug: bool) -> Self {
        Self { db, origin, base, ttl, debug }
    }

    /// Prepare the session's cache directory and open the database in it.
    ///
    /// # Errors
    ///
    /// `Error::CacheDir` when the directory is unusable, `Error::Database`
    /// when SQLite cannot open or migrate the file.
    pub async fn open(session: &SessionConfig, origin: Arc<dyn Origin>) -> Result<Self, Error> {
        directory::prepare(&session.cache_dir)?;
        let db = CacheDb::open_in_dir(&session.cache_dir).await?;
        Ok(Self::new(db, origin, session.origin.clone(), session.ttl, session.debug))
    }

    /// Cached response for `path` if fresh, otherwise a live one.
    ///
    /// # Errors
    ///
    /// Invalid paths, network failures, and offline misses.
    pub async fn get_or_fetch(&self, path: &str, policy: FetchPolicy) -> Result<Response, Error> {
        let url = self.base.join(path).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let key = compute_cache_key("GET", url.as_str());

        if policy != FetchPolicy::Refresh {
            match self.db.get_entry(&key).await {
                Ok(Some(entry)) if policy == FetchPolicy::Offline || entry.is_fresh_at(Utc::now()) => {
                    tracing::debug!(url = %url, expires = %entry.expires_at, "cache hit");
                    return Ok(Response::from_entry(entry));
                }
                Ok(Some(_)) => tracing::debug!(url = %url, "cache entry expired"),
                Ok(None) => {}
                Err(e) => tracing::warn!(url = %url, "cache lookup failed, fetching live: {e}"),
            }
        }

        if policy == FetchPolicy::Offline {
            return Err(Error::Offline(url.to_string()));
        }

        let mut response = self.origin.get(&url).await?;

        if is_admitted(response.status) {
            let expires_at = response.fetched_at + self.ttl;
            match self.db.upsert_entry(&response.to_entry(key, expires_at)).await {
                Ok(()) => {
                    response.expires_at = Some(expires_at);
                    tracing::debug!(url = %url, expires = %expires_at, "stored in cache");
                }
                Err(e) => tracing::warn!(url = %url, "failed to store response: {e}"),
            }
        } else {
            tracing::debug!(url = %url, status = response.status.as_u16(), "not caching status");
        }

        Ok(response)
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), but failures become an error page.
    pub async fn fetch(&self, path: &str, policy: FetchPolicy) -> Response {
        match self.get_or_fetch(path, policy).await {
            Ok(response) => response,
            Err(e) => {
                let url = self
                    .base
                    .join(path)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| format!("{}/{}", self.base, path));
                tracing::error!(url = %url, "failed to fetch URL: {e}");
                error_page(&url, &e, self.debug)
            }
        }
    }

    /// Drop every cached entry.
    pub async fn clear(&self) -> Result<u64, Error> {
        self.db.clear().await
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        self.db.purge_expired().await
    }

    pub async fn entry_count(&self) -> Result<u64, Error> {
        self.db.entry_count().await
    }

    /// Close the storage handle. Later lookups fail and fall back to live fetches.
    pub async fn close(&self) -> Result<(), Error> {
        self.db.close().await
    }
}
