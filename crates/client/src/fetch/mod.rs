//! Upstream HTTP fetching for the single proxied origin.
//!
//! ### Origin requests
//! - One reqwest client per session, rustls, gzip/brotli/deflate.
//! - No cookie store and no client headers forwarded: the proxy stays
//!   stateless towards the origin's session handling.
//! - Redirects are not followed; 301/308 are cached and replayed to the
//!   browser with a rewritten `Location`.
//!
//! ### Failure pages
//! - Fetch failures never propagate to the browser as broken connections;
//!   [`error_page`] turns them into an HTML response naming the URL.

pub mod url;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url, header};

pub use self::url::{OriginBase, UrlError};

use wikisearch_core::{CacheEntry, Error};

/// Response headers kept in the cache and replayed to the browser.
pub const HEADERS_OF_INTEREST: [&str; 3] = ["location", "etag", "last-modified"];

/// Configuration for the origin client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "arch-wiki-search/<version>")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("arch-wiki-search/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_millis(20000),
        }
    }
}

/// How the content store may use the cache and the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Serve fresh entries from cache, fetch otherwise.
    #[default]
    Normal,
    /// Always fetch from the origin, then store.
    Refresh,
    /// Never contact the origin; serve stale entries rather than nothing.
    Offline,
}

/// An upstream response, live or replayed from the cache.
#[derive(Debug, Clone)]
pub struct Response {
    /// Full origin URL
    pub url: String,
    /// HTTP status code
    pub status: StatusCode,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Headers of interest, lowercase names
    pub headers: BTreeMap<String, String>,
    /// Response body bytes
    pub body: Bytes,
    /// When the origin produced this response
    pub fetched_at: DateTime<Utc>,
    /// When the cached copy goes stale, if it was stored
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether this was served from the cache
    pub from_cache: bool,
    /// Generated locally, e.g. an error page; converters leave its links alone
    pub synthetic: bool,
    /// Time taken to fetch in milliseconds (0 for cache hits)
    pub fetch_ms: u64,
}

impl Response {
    /// Rebuild a response from a stored entry.
    pub fn from_entry(entry: CacheEntry) -> Self {
        Self {
            url: entry.url,
            status: StatusCode::from_u16(entry.status_code).unwrap_or(StatusCode::OK),
            content_type: entry.content_type,
            headers: entry.headers,
            body: Bytes::from(entry.body),
            fetched_at: entry.fetched_at,
            expires_at: Some(entry.expires_at),
            from_cache: true,
            synthetic: false,
            fetch_ms: 0,
        }
    }

    /// Build the entry persisted for this response.
    pub fn to_entry(&self, key: String, expires_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            key,
            method: "GET".to_string(),
            url: self.url.clone(),
            status_code: self.status.as_u16(),
            content_type: self.content_type.clone(),
            headers: self.headers.clone(),
            body: self.body.to_vec(),
            fetched_at: self.fetched_at,
            expires_at,
        }
    }

}

/// Source of live responses.
///
/// The content store talks to the network only through this trait.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Perform one GET against the origin.
    async fn get(&self, url: &Url) -> Result<Response, Error>;
}

/// reqwest-backed origin client.
pub struct HttpOrigin {
    http: Client,
}

impl HttpOrigin {
    /// Create a new origin client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn get(&self, url: &Url) -> Result<Response, Error> {
        let start = Instant::now();

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::FetchTimeout(format!("{url}: {e}"))
                } else {
                    Error::HttpError(format!("network error: {e}"))
                }
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let headers = interesting_headers(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::BodyRead { status: status.as_u16(), reason: e.to_string() })?;

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("fetched {} -> {} in {}ms ({} bytes)", url, status.as_u16(), fetch_ms, body.len());

        Ok(Response {
            url: url.to_string(),
            status,
            content_type,
            headers,
            body,
            fetched_at: Utc::now(),
            expires_at: None,
            from_cache: false,
            synthetic: false,
            fetch_ms,
        })
    }
}

fn interesting_headers(headers: &header::HeaderMap) -> BTreeMap<String, String> {
    HEADERS_OF_INTEREST
        .iter()
        .filter_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

/// Render a fetch failure as an HTML page.
///
/// The status comes from the origin when it answered, 504 for offline
/// misses and 502 otherwise. In debug mode the full error is included.
pub fn error_page(url: &str, err: &Error, debug: bool) -> Response {
    let status = match err {
        Error::Offline(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => err
            .upstream_status()
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::BAD_GATEWAY),
    };

    let shown = escape_html(url);
    let mut html = format!(
        "<!DOCTYPE html><html><head><title>Failed to fetch URL</title></head><body><h3>Failed to fetch URL: {shown}</h3><p>{}</p>",
        escape_html(&err.to_string())
    );
    if debug {
        html.push_str(&format!("<pre><code>{}</code></pre>", escape_html(&format!("{err:#?}"))));
    }
    html.push_str("</body></html>");

    Response {
        url: url.to_string(),
        status,
        content_type: Some("text/html; charset=utf-8".to_string()),
        headers: BTreeMap::new(),
        body: Bytes::from(html),
        fetched_at: Utc::now(),
        expires_at: None,
        from_cache: false,
        synthetic: true,
        fetch_ms: 0,
    }
}

/// Ampersands stay literal so URLs with query strings remain readable.
fn escape_html(s: &str) -> String {
    s.replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}
