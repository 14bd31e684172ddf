//! Presentation layer: display slots the loader delivers into.

/// Reusable widgets.
pub mod widgets;

pub use widgets::ImageSlot;
