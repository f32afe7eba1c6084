//! Cache entry CRUD operations.
//!
//! One row per (method, URL). Rows are overwritten when a stale entry is
//! refetched and never evicted by size.

use std::collections::BTreeMap;

use super::connection::CacheDb;
use crate::Error;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored upstream response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    /// Response headers worth replaying (location, etag, last-modified).
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether the entry is still within its TTL at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Timestamps are stored with a fixed width so SQL string comparison orders them.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(field: &str, value: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::CorruptEntry(format!("{field}: {e}")))
}

struct EntryRow {
    key: String,
    method: String,
    url: String,
    status_code: i64,
    content_type: Option<String>,
    headers_json: Option<String>,
    body: Vec<u8>,
    fetched_at: String,
    expires_at: String,
}

impl TryFrom<EntryRow> for CacheEntry {
    type Error = Error;

    fn try_from(row: EntryRow) -> Result<Self, Error> {
        let status_code = u16::try_from(row.status_code)
            .map_err(|_| Error::CorruptEntry(format!("status_code: {}", row.status_code)))?;
        let headers = match row.headers_json.as_deref() {
            Some(json) => serde_json::from_str(json).map_err(|e| Error::CorruptEntry(format!("headers: {e}")))?,
            None => BTreeMap::new(),
        };

        Ok(CacheEntry {
            key: row.key,
            method: row.method,
            url: row.url,
            status_code,
            content_type: row.content_type,
            headers,
            body: row.body,
            fetched_at: parse_ts("fetched_at", &row.fetched_at)?,
            expires_at: parse_ts("expires_at", &row.expires_at)?,
        })
    }
}

impl CacheDb {
    /// Insert or replace a cached entry.
    pub async fn upsert_entry(&self, entry: &CacheEntry) -> Result<(), Error> {
        let headers_json = if entry.headers.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&entry.headers).map_err(|e| Error::CorruptEntry(e.to_string()))?)
        };
        let entry = entry.clone();
        let fetched_at = format_ts(&entry.fetched_at);
        let expires_at = format_ts(&entry.expires_at);

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (
                    key, method, url, status_code, content_type, headers_json,
                    body, fetched_at, expires_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(key) DO UPDATE SET
                    method = excluded.method,
                    url = excluded.url,
                    status_code = excluded.status_code,
                    content_type = excluded.content_type,
                    headers_json = excluded.headers_json,
                    body = excluded.body,
                    fetched_at = excluded.fetched_at,
                    expires_at = excluded.expires_at",
                    params![
                        &entry.key,
                        &entry.method,
                        &entry.url,
                        entry.status_code as i64,
                        &entry.content_type,
                        &headers_json,
                        &entry.body,
                        &fetched_at,
                        &expires_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by key, fresh or not.
    ///
    /// Returns None if the key doesn't exist in the cache.
    pub async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let key = key.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<EntryRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key, method, url, status_code, content_type, headers_json,
                    body, fetched_at, expires_at
                FROM entries WHERE key = ?1",
                )?;

                let result = stmt.query_row(params![key], |row| {
                    Ok(EntryRow {
                        key: row.get(0)?,
                        method: row.get(1)?,
                        url: row.get(2)?,
                        status_code: row.get(3)?,
                        content_type: row.get(4)?,
                        headers_json: row.get(5)?,
                        body: row.get(6)?,
                        fetched_at: row.get(7)?,
                        expires_at: row.get(8)?,
                    })
                });

                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(CacheEntry::try_from).transpose()
    }

    /// Delete expired entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let now = format_ts(&Utc::now());
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM entries WHERE expires_at <= ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry.
    pub async fn clear(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM entries", [])?;
                conn.execute_batch("VACUUM")?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of stored entries.
    pub async fn entry_count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::hash::compute_cache_key;
    use chrono::Duration;

    fn make_test_entry(url: &str, ttl: Duration) -> CacheEntry {
        let fetched_at = Utc::now();
        let mut headers = BTreeMap::new();
        headers.insert("etag".to_string(), "\"abc\"".to_string());
        CacheEntry {
            key: compute_cache_key("GET", url),
            method: "GET".to_string(),
            url: url.to_string(),
            status_code: 200,
            content_type: Some("text/html; charset=UTF-8".to_string()),
            headers,
            body: b"<html><body>Pacman</body></html>".to_vec(),
            fetched_at,
            expires_at: fetched_at + ttl,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_test_entry("https://wiki.archlinux.org/title/Pacman", Duration::days(30));

        db.upsert_entry(&entry).await.unwrap();

        let retrieved = db.get_entry(&entry.key).await.unwrap().unwrap();
        assert_eq!(retrieved.url, entry.url);
        assert_eq!(retrieved.body, entry.body);
        assert_eq!(retrieved.headers.get("etag").map(String::as_str), Some("\"abc\""));
        assert!(retrieved.is_fresh_at(Utc::now()));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.get_entry("nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mut entry = make_test_entry("https://example.org/wiki/Foo", Duration::days(8));
        db.upsert_entry(&entry).await.unwrap();

        entry.body = b"updated".to_vec();
        entry.status_code = 301;
        db.upsert_entry(&entry).await.unwrap();

        let retrieved = db.get_entry(&entry.key).await.unwrap().unwrap();
        assert_eq!(retrieved.body, b"updated".to_vec());
        assert_eq!(retrieved.status_code, 301);
        assert_eq!(db.entry_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_entry(&make_test_entry("https://example.org/old", Duration::days(-1)))
            .await
            .unwrap();
        db.upsert_entry(&make_test_entry("https://example.org/new", Duration::days(1)))
            .await
            .unwrap();

        let deleted = db.purge_expired().await.unwrap();
        assert_eq!(deleted, 1);

        let old = db.get_entry(&compute_cache_key("GET", "https://example.org/old")).await.unwrap();
        assert!(old.is_none());
        let new = db.get_entry(&compute_cache_key("GET", "https://example.org/new")).await.unwrap();
        assert!(new.is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_entry(&make_test_entry("https://example.org/a", Duration::days(1)))
            .await
            .unwrap();
        db.upsert_entry(&make_test_entry("https://example.org/b", Duration::days(1)))
            .await
            .unwrap();

        assert_eq!(db.clear().await.unwrap(), 2);
        assert_eq!(db.entry_count().await.unwrap(), 0);
    }

    #[test]
    fn test_expired_entry_is_not_fresh() {
        let entry = make_test_entry("https://example.org/", Duration::seconds(-5));
        assert!(!entry.is_fresh_at(Utc::now()));
    }
}
