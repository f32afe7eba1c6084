//! Shared fixtures for the server tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use chrono::Utc;
use url::Url;
use wikisearch_client::{ContentStore, Origin, OriginBase, Response, SessionConfig};
use wikisearch_core::{AppConfig, CacheDb, Error};

pub const ORIGIN: &str = "https://example.org";

/// Origin that counts calls and serves a fixed HTML body.
pub struct CountingOrigin {
    pub calls: AtomicUsize,
    pub status: StatusCode,
    pub body: &'static str,
    pub delay: Duration,
    pub headers: BTreeMap<String, String>,
    pub unreachable: bool,
}

impl CountingOrigin {
    pub fn ok(body: &'static str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            status: StatusCode::OK,
            body,
            delay: Duration::ZERO,
            headers: BTreeMap::new(),
            unreachable: false,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Origin for CountingOrigin {
    async fn get(&self, url: &Url) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unreachable {
            return Err(Error::HttpError("network error: connection refused".into()));
        }
        Ok(Response {
            url: url.to_string(),
            status: self.status,
            content_type: Some("text/html; charset=utf-8".into()),
            headers: self.headers.clone(),
            body: Bytes::from_static(self.body.as_bytes()),
            fetched_at: Utc::now(),
            expires_at: None,
            from_cache: false,
            synthetic: false,
            fetch_ms: 1,
        })
    }
}

pub fn session(port: u16) -> SessionConfig {
    let mut session = SessionConfig::from_app(&AppConfig::default(), OriginBase::parse(ORIGIN).unwrap());
    session.port = port;
    session
}

pub async fn store_with(origin: Arc<CountingOrigin>) -> ContentStore {
    let db = CacheDb::open_in_memory().await.unwrap();
    ContentStore::new(db, origin, OriginBase::parse(ORIGIN).unwrap(), chrono::Duration::days(30), false)
}
