//! Port for display targets.

use tokio::sync::watch;

use crate::domain::entities::{SlotContent, SlotId, TargetSize};

/// A UI element that shows one image at a time.
///
/// `show` is called with the loader's per-slot lock held, so it must be
/// quick and must not call back into the loader. Implementations that
/// render on a dedicated UI thread should hand the content over (e.g.
/// through a channel) rather than render inline.
pub trait DisplaySlot: Send + Sync {
    /// Stable identity of this slot.
    fn id(&self) -> SlotId;

    /// Replaces the displayed content.
    fn show(&self, content: SlotContent);

    /// Current layout size; `0x0` until layout completes.
    fn target_size(&self) -> TargetSize;

    /// Subscribes to layout changes. The value becomes laid out (both
    /// dimensions non-zero) once the slot knows its size.
    fn layout(&self) -> watch::Receiver<TargetSize>;
}
