//! Domain layer with core entities and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{
    CacheKey, CachedImage, ImageSource, LoadOutcome, LoadSpec, RequestState, SlotContent, SlotId,
    TargetSize, Transition,
};
pub use errors::ImageError;
pub use ports::{DisplaySlot, ImageCachePort, ImageTransport};
