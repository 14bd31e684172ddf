//! Disk-based image cache with a fixed validity window.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, trace, warn};

use crate::domain::entities::CacheKey;
use crate::domain::errors::ImageError;
use crate::domain::ports::{CacheResult, ImageCachePort};

/// Name of the subdirectory owned by the disk cache.
pub const DEFAULT_CACHE_DIR_NAME: &str = "image_cache";

/// Entries older than this are misses (4 hours).
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(4 * 60 * 60);

/// Disk cache of encoded image bytes, one file per key.
///
/// File modification time is the only staleness signal. Expired files
/// are left in place until [`ImageCachePort::clear`].
#[derive(Debug)]
pub struct DiskImageCache {
    cache_dir: PathBuf,
    validity: Duration,
}

impl DiskImageCache {
    /// Creates a cache in `root/dir_name`, creating the directory.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be created.
    pub fn new(root: &Path, dir_name: &str, validity: Duration) -> CacheResult<Self> {
        let cache_dir = root.join(dir_name);
        fs::create_dir_all(&cache_dir)
            .map_err(|e| ImageError::io(format!("Failed to create cache dir: {e}")))?;
        debug!(
            path = %cache_dir.display(),
            validity_secs = validity.as_secs(),
            "Opened disk cache"
        );
        Ok(Self {
            cache_dir,
            validity,
        })
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path of the file for `key`.
    #[must_use]
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.as_str())
    }

    /// Returns true if a fresh entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        fs::metadata(self.entry_path(key)).is_ok_and(|meta| self.is_fresh(&meta))
    }

    fn is_fresh(&self, meta: &fs::Metadata) -> bool {
        let Ok(modified) = meta.modified() else {
            return false;
        };
        // A modification time in the future counts as age zero.
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        age < self.validity
    }
}

impl ImageCachePort for DiskImageCache {
    type Value = Vec<u8>;

    fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        let Ok(meta) = fs::metadata(&path) else {
            trace!(key = %key, "Disk cache miss");
            return None;
        };
        if !self.is_fresh(&meta) {
            trace!(key = %key, "Disk cache entry expired");
            return None;
        }
        match fs::read(&path) {
            Ok(bytes) => {
                trace!(key = %key, path = %path.display(), "Disk cache hit");
                Some(bytes)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read disk cache entry");
                None
            }
        }
    }

    /// Writes through a temporary file in the cache directory and renames
    /// it over the entry, so readers never see a partial file.
    fn put(&self, key: &CacheKey, value: Vec<u8>) -> CacheResult<bool> {
        let path = self.entry_path(key);

        let mut temp_file = tempfile::NamedTempFile::new_in(&self.cache_dir)
            .map_err(|e| ImageError::cache_write(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(&value)
            .map_err(|e| ImageError::cache_write(format!("Failed to write cache file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ImageError::cache_write(format!("Failed to flush cache file: {e}")))?;
        temp_file.persist(&path).map_err(|e| {
            ImageError::cache_write(format!("Failed to persist cache file: {}", e.error))
        })?;

        debug!(
            key = %key,
            path = %path.display(),
            size = value.len(),
            "Stored image in disk cache"
        );
        Ok(true)
    }

    fn clear(&self) -> CacheResult<()> {
        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| ImageError::io(format!("Failed to read cache dir: {e}")))?;

        let mut removed = 0usize;
        for entry in entries {
            let entry = entry.map_err(|e| ImageError::io(format!("Failed to read entry: {e}")))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove cache file"),
            }
        }
        debug!(removed, "Cleared disk cache");
        Ok(())
    }

    fn len(&self) -> usize {
        fs::read_dir(&self.cache_dir).map_or(0, |entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| entry.path().is_file())
                .count()
        })
    }
}

/// Returns the default cache root directory.
#[must_use]
pub fn default_cache_root() -> PathBuf {
    directories::ProjectDirs::from("com", "linuxmobile", "slotimg").map_or_else(
        || std::env::temp_dir().join("slotimg").join("cache"),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_cache(validity: Duration) -> (DiskImageCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::new(temp_dir.path(), DEFAULT_CACHE_DIR_NAME, validity).unwrap();
        (cache, temp_dir)
    }

    fn backdate(path: &Path, by: Duration) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn test_put_and_get_bytes() {
        let (cache, _temp) = create_test_cache(DEFAULT_VALIDITY);
        let key = CacheKey::from_url("https://example.com/1.png");

        assert!(cache.put(&key, b"test image data".to_vec()).unwrap());
        assert_eq!(cache.get(&key).unwrap(), b"test image data");
        assert!(cache.contains(&key));
    }

    #[test]
    fn test_cache_miss() {
        let (cache, _temp) = create_test_cache(DEFAULT_VALIDITY);
        let key = CacheKey::from_url("nonexistent");

        assert!(cache.get(&key).is_none());
        assert!(!cache.contains(&key));
    }

    #[test]
    fn test_expired_entry_is_miss_but_file_remains() {
        let (cache, _temp) = create_test_cache(DEFAULT_VALIDITY);
        let key = CacheKey::from_url("https://example.com/old.png");

        cache.put(&key, b"old".to_vec()).unwrap();
        backdate(&cache.entry_path(&key), DEFAULT_VALIDITY + Duration::from_secs(1));

        assert!(cache.get(&key).is_none());
        assert!(!cache.contains(&key));
        assert!(cache.entry_path(&key).exists());
    }

    #[test]
    fn test_entry_just_inside_window_is_hit() {
        let (cache, _temp) = create_test_cache(DEFAULT_VALIDITY);
        let key = CacheKey::from_url("https://example.com/recent.png");

        cache.put(&key, b"recent".to_vec()).unwrap();
        backdate(&cache.entry_path(&key), DEFAULT_VALIDITY - Duration::from_secs(60));

        assert_eq!(cache.get(&key).unwrap(), b"recent");
    }

    #[test]
    fn test_zero_validity_always_misses() {
        let (cache, _temp) = create_test_cache(Duration::ZERO);
        let key = CacheKey::from_url("https://example.com/a.png");

        cache.put(&key, b"data".to_vec()).unwrap();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_put_overwrites_and_refreshes() {
        let (cache, _temp) = create_test_cache(DEFAULT_VALIDITY);
        let key = CacheKey::from_url("https://example.com/a.png");

        cache.put(&key, b"first".to_vec()).unwrap();
        backdate(&cache.entry_path(&key), DEFAULT_VALIDITY * 2);
        cache.put(&key, b"second".to_vec()).unwrap();

        assert_eq!(cache.get(&key).unwrap(), b"second");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (cache, _temp) = create_test_cache(DEFAULT_VALIDITY);
        for i in 0..5 {
            let key = CacheKey::from_url(&format!("https://example.com/{i}.png"));
            cache.put(&key, vec![i; 64]).unwrap();
        }

        let names: Vec<String> = fs::read_dir(cache.cache_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 5);
        assert!(names.iter().all(|n| n.len() == CacheKey::LEN));
    }

    #[test]
    fn test_concurrent_writes_same_key() {
        let (cache, _temp) = create_test_cache(DEFAULT_VALIDITY);
        let cache = std::sync::Arc::new(cache);
        let key = CacheKey::from_url("https://example.com/shared.png");

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let cache = cache.clone();
                let key = key.clone();
                std::thread::spawn(move || cache.put(&key, vec![i; 4096]).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let bytes = cache.get(&key).unwrap();
        assert_eq!(bytes.len(), 4096);
        assert!(bytes.iter().all(|b| *b == bytes[0]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let (cache, _temp) = create_test_cache(DEFAULT_VALIDITY);
        let a = CacheKey::from_url("a");
        let b = CacheKey::from_url("b");

        cache.put(&a, b"data1".to_vec()).unwrap();
        cache.put(&b, b"data2".to_vec()).unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_none());
    }

    #[test]
    fn test_put_after_clear() {
        let (cache, _temp) = create_test_cache(DEFAULT_VALIDITY);
        let key = CacheKey::from_url("a");

        cache.clear().unwrap();
        cache.put(&key, b"data".to_vec()).unwrap();
        assert_eq!(cache.len(), 1);
    }
}
