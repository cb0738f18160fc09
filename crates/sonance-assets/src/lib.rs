//! Sonance Assets - Audio asset fetching and caching
//!
//! Fetches encoded audio bytes through a pluggable [`AssetSource`] (HTTP,
//! filesystem or in-memory) and memoizes them in an [`AssetCache`] that
//! coalesces concurrent loads of the same URL.

mod cache;
mod entry;
mod error;
mod source;

pub use cache::AssetCache;
pub use entry::{AssetEntry, Codec};
pub use error::AssetError;
pub use source::{AssetSource, FileSource, Fetched, HttpSource, MemorySource};
