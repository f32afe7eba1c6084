//! Origin base URL validation and request path composition.

use std::fmt;

/// Error type for origin URL failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("missing host: {0}")]
    MissingHost(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// The single origin a session proxies, without trailing slash.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an explicit http:// or https:// scheme
/// 3. Lowercase the host
/// 4. Remove query and fragment
/// 5. Remove trailing slashes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginBase(String);

impl OriginBase {
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Err(UrlError::Empty);
        }

        let mut parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(format!("{trimmed}: {e}")))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
        }

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .map(str::to_lowercase)
            .ok_or_else(|| UrlError::MissingHost(trimmed.to_string()))?;
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

        parsed.set_query(None);
        parsed.set_fragment(None);

        Ok(Self(parsed.as_str().trim_end_matches('/').to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full origin URL for a relative path with optional query string.
    pub fn join(&self, path: &str) -> Result<url::Url, UrlError> {
        let full = format!("{}/{}", self.0, path.trim_start_matches('/'));
        url::Url::parse(&full).map_err(|e| UrlError::InvalidUrl(format!("{full}: {e}")))
    }

    /// Relative target path from a proxied request path.
    ///
    /// Accepts both `/title/Foo` and `/https://origin/title/Foo`.
    pub fn target_path(&self, raw: &str) -> String {
        let trimmed = raw.trim_start_matches('/');
        let rest = trimmed.strip_prefix(self.0.as_str()).unwrap_or(trimmed);
        rest.trim_start_matches('/').to_string()
    }
}

impl fmt::Display for OriginBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
