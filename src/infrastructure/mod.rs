//! Infrastructure layer with external service adapters.

/// Image catalog client.
pub mod catalog;
/// Application configuration.
pub mod config;
/// Image handling (caching, fetching, request coordination).
pub mod image;

pub use catalog::{CatalogClient, CatalogItem};
pub use config::{AppConfig, CliArgs, ConfigStore, LogLevel};
pub use image::{
    CacheStats, DiskImageCache, HttpTransport, ImageLoader, ImageLoaderConfig, MemoryImageCache,
    RequestHandle,
};
