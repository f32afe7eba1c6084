//! SQLite-backed store for proxied wiki responses.
//!
//! This module provides a persistent cache using SQLite with async access via
//! tokio-rusqlite. It supports:
//!
//! - Entries keyed by SHA-256 of method and URL
//! - Time-based expiry, no size eviction
//! - Automatic schema migrations
//! - Cache directory preparation and size reporting

pub mod connection;
pub mod directory;
pub mod entries;
pub mod hash;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CacheEntry;
