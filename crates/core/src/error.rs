//! Unified error types for arch-wiki-search.
//!
//! Configuration failures are fatal and map to process exit codes in the
//! binary. Fetch failures are rendered as error pages by the proxy and never
//! reach the browser as a broken connection.

use tokio_rusqlite::rusqlite;

/// Unified error types for the caching proxy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Origin URL is malformed or not http(s).
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Cache directory exists but is not writable, or cannot be created.
    #[error("CACHE_DIR: {0}")]
    CacheDir(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Storage failure reported only as text.
    #[error("CACHE_ERROR: {0}")]
    Storage(String),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored entry could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Network error talking to the origin.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// The origin answered but the body could not be read.
    #[error("BODY_READ: status {status}: {reason}")]
    BodyRead { status: u16, reason: String },

    /// Offline mode and nothing cached for the URL.
    #[error("OFFLINE: {0} is not in the cache")]
    Offline(String),

    /// No known wiki with this name.
    #[error("UNKNOWN_WIKI: {0}")]
    UnknownWiki(String),

    /// Listener could not be bound.
    #[error("BIND_FAILED: {0}")]
    Bind(String),
}

impl Error {
    /// Status code of the upstream attempt, when the origin actually answered.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Error::BodyRead { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            other => Error::Storage(other.to_string()),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
