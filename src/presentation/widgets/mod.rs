mod image_slot;

pub use image_slot::{ImageSlot, MAX_HISTORY};
