//! Core types and shared functionality for arch-wiki-search.
//!
//! This crate provides:
//! - Response cache with SQLite backend
//! - Unified error types
//! - Configuration structures and the known-wiki registry

pub mod cache;
pub mod config;
pub mod error;
pub mod wikis;

pub use cache::{CacheDb, CacheEntry};
pub use config::{AppConfig, ConfigError, ConversionMode};
pub use error::Error;
pub use wikis::{Wiki, Wikis};
