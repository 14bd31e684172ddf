//! Domain entity definitions.

mod image;
mod request;

pub use image::{CacheKey, CachedImage, ImageSource};
pub use request::{
    LoadOutcome, LoadSpec, RequestState, RequestTag, SlotContent, SlotId, TargetSize, Transition,
};
