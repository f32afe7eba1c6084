//! Fatal startup errors and their process exit codes.
//!
//! | code | meaning |
//! |---|---|
//! | 1 | configuration error, unknown wiki, anything else |
//! | 2 | invalid origin URL |
//! | 3 | proxy failed to start |
//! | 4 | cache directory unusable |

use std::process::ExitCode;

use wikisearch_client::UrlError;
use wikisearch_core::{ConfigError, Error};

/// Errors that end the process before or while starting the proxy.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("INVALID_URL: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error(transparent)]
    Core(#[from] Error),
}

impl StartupError {
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::InvalidUrl(_) | StartupError::Core(Error::InvalidUrl(_)) => 2,
            StartupError::Core(Error::Bind(_)) => 3,
            StartupError::Core(Error::CacheDir(_)) => 4,
            _ => 1,
        }
    }
}

impl From<StartupError> for ExitCode {
    fn from(err: StartupError) -> Self {
        ExitCode::from(err.exit_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let cases: Vec<(StartupError, u8)> = vec![
            (ConfigError::LoadFailed("bad toml".into()).into(), 1),
            (Error::UnknownWiki("nope".into()).into(), 1),
            (UrlError::UnsupportedScheme("ftp".into()).into(), 2),
            (Error::InvalidUrl("x".into()).into(), 2),
            (Error::Bind("127.0.0.1:8888: address in use".into()).into(), 3),
            (Error::CacheDir("/root/.cache: not writable".into()).into(), 4),
        ];
        for (err, code) in cases {
            assert_eq!(err.exit_code(), code, "{err}");
        }
    }

    #[test]
    fn test_message_keeps_tag() {
        let err = StartupError::from(Error::CacheDir("/nope".into()));
        assert_eq!(err.to_string(), "CACHE_DIR: /nope");
    }
}
