//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! (WAL mode), running migrations and closing the handle on shutdown.

use super::migrations;
use crate::Error;
use std::path::{Path, PathBuf};
use tokio_rusqlite::Connection;

/// File name of the database inside the cache directory.
pub const DB_FILE_NAME: &str = "cache.sqlite";

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Cache database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Clones share the same connection.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Open the database inside `cache_dir`.
    ///
    /// The directory must already exist (see [`super::directory::prepare`]).
    pub async fn open_in_dir(cache_dir: impl AsRef<Path>) -> Result<Self, Error> {
        let path: PathBuf = cache_dir.as_ref().join(DB_FILE_NAME);
        Self::open(path).await
    }

    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::configure(conn).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::configure(conn).await
    }

    async fn configure(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        let version = migrations::run(&conn).await?;
        tracing::debug!(version, "cache schema ready");

        Ok(Self { conn })
    }

    /// Close the underlying connection.
    ///
    /// Pending calls from other clones fail with a closed-connection error.
    pub async fn close(&self) -> Result<(), Error> {
        self.conn.clone().close().await.map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let version = db
            .conn
            .call(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0)))
            .await
            .unwrap();
        assert!(!version.is_empty());
    }

    #[tokio::test]
    async fn test_open_in_dir_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = CacheDb::open_in_dir(dir.path()).await.unwrap();
        assert!(dir.path().join(DB_FILE_NAME).exists());
        db.close().await.unwrap();
    }
}
