//! Link extraction for background prefetching.

pub mod links;

pub use links::{LinkSet, prefetch_path};
