//! In-memory LRU image cache bounded by decoded byte size.

use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, CachedImage};
use crate::domain::ports::{CacheResult, ImageCachePort};

/// Default memory budget (64 MiB of decoded pixels).
pub const DEFAULT_MEMORY_BUDGET: usize = 64 * 1024 * 1024;

struct Entries {
    lru: LruCache<CacheKey, CachedImage>,
    total_bytes: usize,
}

/// In-memory LRU cache for decoded images.
///
/// The sum of `byte_footprint` over all entries never exceeds the
/// budget. Recency order and the byte total are updated under one lock.
pub struct MemoryImageCache {
    entries: Mutex<Entries>,
    budget: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache holding at most `budget` bytes of pixels.
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::unbounded(),
                total_bytes: 0,
            }),
            budget,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default budget.
    #[must_use]
    pub fn with_default_budget() -> Self {
        Self::new(DEFAULT_MEMORY_BUDGET)
    }

    /// Bytes currently accounted to cached images.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.entries.lock().total_bytes
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let (size, bytes) = {
            let entries = self.entries.lock();
            (entries.lru.len(), entries.total_bytes)
        };
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate,
            size,
            bytes,
            budget: self.budget,
        }
    }

    /// Peeks at an image without promoting it in the LRU.
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<CachedImage> {
        self.entries.lock().lru.peek(key).cloned()
    }

    /// Returns true if `key` is cached, without promoting it.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().lru.contains(key)
    }

    /// Inserts `image` unless `key` is already present, evicting least
    /// recently used entries until it fits. Returns whether it was inserted.
    fn insert(&self, key: &CacheKey, image: CachedImage) -> bool {
        let size = image.byte_footprint();
        if size > self.budget {
            debug!(
                key = %key,
                size,
                budget = self.budget,
                "Image exceeds memory budget, not caching"
            );
            return false;
        }

        let mut entries = self.entries.lock();
        if entries.lru.contains(key) {
            trace!(key = %key, "Memory cache already holds key");
            return false;
        }

        while entries.total_bytes + size > self.budget {
            let Some((evicted, old)) = entries.lru.pop_lru() else {
                break;
            };
            entries.total_bytes -= old.byte_footprint();
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(key = %evicted, size = old.byte_footprint(), "Evicted from memory cache");
        }

        entries.lru.put(key.clone(), image);
        entries.total_bytes += size;
        debug!(key = %key, size, total = entries.total_bytes, "Stored image in memory cache");
        true
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_default_budget()
    }
}

impl std::fmt::Debug for MemoryImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImageCache")
            .field("budget", &self.budget)
            .field("total_bytes", &self.total_bytes())
            .finish_non_exhaustive()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries evicted to make room.
    pub evictions: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Accounted bytes.
    pub bytes: usize,
    /// Byte budget.
    pub budget: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {}/{} bytes, {:.1}% hit rate ({} hits, {} misses, {} evictions)",
            self.size,
            self.bytes,
            self.budget,
            self.hit_rate,
            self.hits,
            self.misses,
            self.evictions
        )
    }
}

impl ImageCachePort for MemoryImageCache {
    type Value = CachedImage;

    fn get(&self, key: &CacheKey) -> Option<CachedImage> {
        let found = self.entries.lock().lru.get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
        }
        found
    }

    fn put(&self, key: &CacheKey, value: CachedImage) -> CacheResult<bool> {
        Ok(self.insert(key, value))
    }

    fn clear(&self) -> CacheResult<()> {
        let mut entries = self.entries.lock();
        entries.lru.clear();
        entries.total_bytes = 0;
        debug!("Cleared memory image cache");
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.lock().lru.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn rgba(width: u32, height: u32) -> CachedImage {
        CachedImage::new(image::DynamicImage::new_rgba8(width, height))
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::from_url(name)
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = MemoryImageCache::new(1024 * 1024);
        let img = rgba(100, 100);

        assert!(cache.put(&key("test1"), img.clone()).unwrap());
        let retrieved = cache.get(&key("test1")).unwrap();

        assert!(retrieved.ptr_eq(&img));
        assert_eq!(cache.total_bytes(), 100 * 100 * 4);
    }

    #[test]
    fn test_cache_miss() {
        let cache = MemoryImageCache::new(1024);
        assert!(cache.get(&key("nonexistent")).is_none());
    }

    #[test]
    fn test_first_writer_wins() {
        let cache = MemoryImageCache::new(1024 * 1024);
        let v1 = rgba(10, 10);
        let v2 = rgba(20, 20);

        assert!(cache.put(&key("k"), v1.clone()).unwrap());
        assert!(!cache.put(&key("k"), v2).unwrap());

        assert!(cache.get(&key("k")).unwrap().ptr_eq(&v1));
        assert_eq!(cache.total_bytes(), 10 * 10 * 4);
    }

    #[test]
    fn test_lru_eviction_by_bytes() {
        // Room for exactly two 10x10 RGBA images.
        let cache = MemoryImageCache::new(2 * 400);

        cache.put(&key("a"), rgba(10, 10)).unwrap();
        cache.put(&key("b"), rgba(10, 10)).unwrap();
        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get(&key("a")).is_some());
        cache.put(&key("c"), rgba(10, 10)).unwrap();

        assert!(cache.peek(&key("a")).is_some());
        assert!(cache.peek(&key("b")).is_none());
        assert!(cache.peek(&key("c")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_large_insert_evicts_several() {
        let cache = MemoryImageCache::new(1000);
        for name in ["a", "b", "c", "d"] {
            cache.put(&key(name), rgba(5, 10)).unwrap(); // 200 bytes each
        }
        assert_eq!(cache.total_bytes(), 800);

        cache.put(&key("big"), rgba(10, 20)).unwrap(); // 800 bytes
        assert!(cache.peek(&key("big")).is_some());
        assert!(cache.total_bytes() <= 1000);
        assert_eq!(cache.len(), 2);
        assert!(cache.peek(&key("d")).is_some());
    }

    #[test]
    fn test_oversize_image_rejected() {
        let cache = MemoryImageCache::new(100);
        assert!(!cache.put(&key("huge"), rgba(10, 10)).unwrap());
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_budget_never_exceeded() {
        let budget = 5_000;
        let cache = MemoryImageCache::new(budget);
        for i in 0..200u32 {
            let w = 1 + (i * 7) % 23;
            let h = 1 + (i * 13) % 17;
            cache.put(&key(&i.to_string()), rgba(w, h)).unwrap();
            assert!(cache.total_bytes() <= budget);
            if i % 3 == 0 {
                let _ = cache.get(&key(&(i / 2).to_string()));
            }
        }
    }

    #[test]
    fn test_clear() {
        let cache = MemoryImageCache::new(1024 * 1024);
        cache.put(&key("a"), rgba(10, 10)).unwrap();
        cache.put(&key("b"), rgba(10, 10)).unwrap();

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
        assert!(cache.get(&key("a")).is_none());
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryImageCache::new(1024);
        cache.put(&key("test1"), rgba(4, 4)).unwrap();

        let _ = cache.get(&key("test1"));
        let _ = cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.bytes, 64);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new(800);

        cache.put(&key("test1"), rgba(10, 10)).unwrap();
        cache.put(&key("test2"), rgba(10, 10)).unwrap();

        let _ = cache.peek(&key("test1"));
        cache.put(&key("test3"), rgba(10, 10)).unwrap();

        assert!(cache.peek(&key("test1")).is_none());
    }

    #[test]
    fn test_concurrent_puts_respect_budget() {
        let budget = 40_000;
        let cache = Arc::new(MemoryImageCache::new(budget));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let name = format!("{t}-{i}");
                        cache.put(&key(&name), rgba(10, 10 + (i % 5))).unwrap();
                        let _ = cache.get(&key(&format!("{t}-{}", i / 2)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let expected: usize = {
            let entries = cache.entries.lock();
            entries.lru.iter().map(|(_, v)| v.byte_footprint()).sum()
        };
        assert_eq!(cache.total_bytes(), expected);
        assert!(cache.total_bytes() <= budget);
    }
}
