//! Port definition for image caching.

use crate::domain::entities::CacheKey;
use crate::domain::errors::ImageError;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, ImageError>;

/// Capability shared by the cache tiers.
///
/// Implementations must be thread-safe. Operations may block on I/O;
/// callers on a latency-sensitive thread should run disk-backed
/// implementations through `spawn_blocking`.
pub trait ImageCachePort: Send + Sync {
    /// Value stored per key.
    type Value: Clone + Send + Sync;

    /// Returns the cached value, or `None` on a miss.
    fn get(&self, key: &CacheKey) -> Option<Self::Value>;

    /// Stores a value. Returns whether the value was written.
    ///
    /// # Errors
    /// Returns error if the backing store rejects the write.
    fn put(&self, key: &CacheKey, value: Self::Value) -> CacheResult<bool>;

    /// Removes every entry.
    ///
    /// # Errors
    /// Returns error if the backing store cannot be cleared.
    fn clear(&self) -> CacheResult<()>;

    /// Returns the current number of entries.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
