//! Page Merger Cache Library
//!
//! In-memory cache of rendered page thumbnails with LRU eviction.

pub mod config;
pub mod ram;

pub use config::CacheConfig;
pub use ram::{CacheStats, CachedThumbnail, RamThumbnailCache};
