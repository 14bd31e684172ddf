//! Load requests and the display slots they are bound to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::image::{CacheKey, CachedImage, ImageSource};

/// Identity of a display slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

impl SlotId {
    /// Allocates a process-unique slot id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// Display dimensions of a slot in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl TargetSize {
    /// Creates a target size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true when both dimensions are non-zero.
    #[must_use]
    pub const fn is_laid_out(self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl std::fmt::Display for TargetSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Visual transition applied when an image is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    /// Replace immediately.
    #[default]
    None,
    /// Fade from transparent to opaque over the given duration.
    FadeIn(Duration),
}

/// What a slot is asked to display.
#[derive(Debug, Clone)]
pub enum SlotContent {
    /// Nothing (a request without placeholder was started).
    Empty,
    /// Placeholder shown while a request resolves.
    Placeholder(CachedImage),
    /// The requested image.
    Image {
        /// Decoded image.
        image: CachedImage,
        /// Tier that satisfied the request.
        source: ImageSource,
        /// Transition to apply.
        transition: Transition,
    },
    /// Error asset shown after a failed request.
    Error(CachedImage),
}

impl SlotContent {
    /// Returns the image carried by this content, if any.
    #[must_use]
    pub const fn image(&self) -> Option<&CachedImage> {
        match self {
            Self::Empty => None,
            Self::Placeholder(image) | Self::Error(image) | Self::Image { image, .. } => {
                Some(image)
            }
        }
    }

    /// Returns true for delivered request results.
    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }
}

/// Immutable description of one load request.
#[derive(Debug, Clone)]
pub struct LoadSpec {
    /// Resource URL.
    pub url: String,
    /// Key derived from `url`.
    pub key: CacheKey,
    /// Explicit target size, overriding the slot's layout.
    pub target_size: Option<TargetSize>,
    /// Shown synchronously when the request starts.
    pub placeholder: Option<CachedImage>,
    /// Shown when the request fails.
    pub error_image: Option<CachedImage>,
    /// Fade the delivered image in.
    pub fade_in: bool,
}

impl LoadSpec {
    /// Creates a spec for `url` with no placeholder, error asset or fade.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let key = CacheKey::from_url(&url);
        Self {
            url,
            key,
            target_size: None,
            placeholder: None,
            error_image: None,
            fade_in: false,
        }
    }

    /// Content shown while the request resolves.
    #[must_use]
    pub fn placeholder_content(&self) -> SlotContent {
        self.placeholder
            .clone()
            .map_or(SlotContent::Empty, SlotContent::Placeholder)
    }
}

/// Token binding a request to a slot; the generation changes every time
/// the slot is reassigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTag {
    /// Slot the request is bound to.
    pub slot: SlotId,
    /// Key of the requested image.
    pub key: CacheKey,
    /// Per-slot generation counter.
    pub generation: u64,
}

/// Lifecycle of the request currently bound to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    /// No request has been bound.
    #[default]
    Idle,
    /// Placeholder shown, lookups pending.
    PlaceholderShown,
    /// Satisfied by the memory tier.
    MemoryHit,
    /// Satisfied by the disk tier.
    DiskHit,
    /// Network fetch in progress.
    Downloading,
    /// Fetched and decoded.
    Decoded,
    /// Written to both cache tiers.
    CachesPopulated,
    /// Final image shown.
    Delivered,
    /// Fetch or decode failed.
    Failed,
    /// Error asset (or the retained placeholder) shown.
    ErrorShown,
    /// Superseded by a newer request for the same slot.
    Cancelled,
}

impl RequestState {
    /// Returns true while the request may still deliver.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(
            self,
            Self::PlaceholderShown
                | Self::MemoryHit
                | Self::DiskHit
                | Self::Downloading
                | Self::Decoded
                | Self::CachesPopulated
                | Self::Failed
        )
    }
}

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The image was shown, sourced from the given tier.
    Delivered(ImageSource),
    /// The fetch failed and the error asset (or placeholder) is shown.
    ErrorShown,
    /// The slot was reassigned; the result was dropped.
    Discarded,
    /// The slot never reported usable dimensions.
    Skipped,
}
