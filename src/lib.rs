//! slotimg - A two-tier image cache with a per-slot async loader.
//!
//! Images are looked up in memory, then on disk, then fetched over the
//! network, downsampled to the size of the slot that asked for them, and
//! delivered only if that slot has not been reassigned in the meantime.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, transports, and configuration.
pub mod infrastructure;
/// Presentation layer containing display slots.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "slotimg";
