//! Domain types for cached images.

use std::sync::Arc;

use image::DynamicImage;

/// Fixed-length cache key derived from a resource URL.
///
/// The key is the first 16 bytes of the SHA-256 digest of the URL,
/// hex-encoded. It is stable across process restarts and contains only
/// `[0-9a-f]`, so it doubles as a file name in the disk tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Length of the hex-encoded key.
    pub const LEN: usize = 32;

    /// Derives the key for a URL.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..Self::LEN / 2]))
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded image together with its accounted byte footprint.
///
/// Cloning is cheap; all clones share one pixel buffer.
#[derive(Clone)]
pub struct CachedImage {
    image: Arc<DynamicImage>,
    byte_footprint: usize,
}

impl CachedImage {
    /// Wraps a decoded image, measuring its pixel buffer.
    #[must_use]
    pub fn new(image: DynamicImage) -> Self {
        let byte_footprint = image.as_bytes().len();
        Self {
            image: Arc::new(image),
            byte_footprint,
        }
    }

    /// Returns the decoded image.
    #[must_use]
    pub const fn image(&self) -> &Arc<DynamicImage> {
        &self.image
    }

    /// Size of the decoded pixel buffer in bytes.
    #[must_use]
    pub const fn byte_footprint(&self) -> usize {
        self.byte_footprint
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Returns true if both handles share the same pixel buffer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl From<DynamicImage> for CachedImage {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

impl std::fmt::Debug for CachedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("byte_footprint", &self.byte_footprint)
            .finish()
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from the in-memory LRU cache.
    MemoryCache,
    /// Loaded from the disk cache.
    DiskCache,
    /// Downloaded from the network.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}
