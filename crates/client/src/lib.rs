//! Client code for arch-wiki-search.
//!
//! This crate provides the origin fetcher, the cache-backed content store,
//! response conversion and link extraction used by the proxy server.

pub mod extract;
pub mod fetch;
pub mod session;
pub mod store;
pub mod transform;

pub use extract::{LinkSet, prefetch_path};
pub use fetch::{FetchConfig, FetchPolicy, HttpOrigin, Origin, OriginBase, Response, UrlError, error_page};
pub use session::SessionConfig;
pub use store::ContentStore;
pub use transform::{Converter, Outbound, TransformError, converter_for};
