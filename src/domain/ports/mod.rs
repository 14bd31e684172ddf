mod image_cache_port;
mod slot_port;
mod transport_port;

pub use image_cache_port::{CacheResult, ImageCachePort};
pub use slot_port::DisplaySlot;
pub use transport_port::ImageTransport;

#[cfg(test)]
pub use transport_port::MockImageTransport;

#[cfg(test)]
pub mod mocks {
    pub use super::transport_port::mock::{ScriptedTransport, png_bytes};
}
