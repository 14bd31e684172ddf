//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with byte-budgeted LRU eviction
//! - Disk caching with a validity window
//! - Size-bounded fetch and decode
//! - The per-slot request coordinator

pub mod disk_cache;
pub mod fetcher;
pub mod loader;
pub mod memory_cache;
pub mod transport;

pub use disk_cache::{DiskImageCache, default_cache_root};
pub use fetcher::{FetchedImage, ImageFetcher, downsample_factor};
pub use loader::{ImageLoader, ImageLoaderConfig, RequestBuilder, RequestHandle};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use transport::HttpTransport;
