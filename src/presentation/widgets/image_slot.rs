//! Headless display slot.

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::domain::entities::{CachedImage, SlotContent, SlotId, TargetSize};
use crate::domain::ports::DisplaySlot;

/// Upper bound on recorded history entries.
pub const MAX_HISTORY: usize = 64;

struct SlotView {
    current: SlotContent,
    history: Vec<SlotContent>,
}

/// A display slot that records what it was asked to show.
///
/// Rendering front-ends can poll [`ImageSlot::displayed`] on their own
/// thread; the loader only ever swaps the content.
pub struct ImageSlot {
    id: SlotId,
    view: Mutex<SlotView>,
    layout: watch::Sender<TargetSize>,
}

impl ImageSlot {
    /// Creates a slot that has not been laid out yet.
    #[must_use]
    pub fn new() -> Self {
        Self::with_layout(TargetSize::new(0, 0))
    }

    /// Creates a slot that is already laid out.
    #[must_use]
    pub fn with_size(width: u32, height: u32) -> Self {
        Self::with_layout(TargetSize::new(width, height))
    }

    fn with_layout(size: TargetSize) -> Self {
        let (layout, _) = watch::channel(size);
        Self {
            id: SlotId::next(),
            view: Mutex::new(SlotView {
                current: SlotContent::Empty,
                history: Vec::new(),
            }),
            layout,
        }
    }

    /// Records the layout size and wakes requests waiting for it.
    pub fn set_layout(&self, width: u32, height: u32) {
        self.layout.send_replace(TargetSize::new(width, height));
    }

    /// Content currently shown.
    #[must_use]
    pub fn displayed(&self) -> SlotContent {
        self.view.lock().current.clone()
    }

    /// Image currently shown, whatever its role.
    #[must_use]
    pub fn displayed_image(&self) -> Option<CachedImage> {
        self.view.lock().current.image().cloned()
    }

    /// Everything shown so far, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<SlotContent> {
        self.view.lock().history.clone()
    }
}

impl Default for ImageSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySlot for ImageSlot {
    fn id(&self) -> SlotId {
        self.id
    }

    fn show(&self, content: SlotContent) {
        let mut view = self.view.lock();
        if view.history.len() == MAX_HISTORY {
            view.history.remove(0);
        }
        view.history.push(content.clone());
        view.current = content;
    }

    fn target_size(&self) -> TargetSize {
        *self.layout.borrow()
    }

    fn layout(&self) -> watch::Receiver<TargetSize> {
        self.layout.subscribe()
    }
}

impl std::fmt::Debug for ImageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSlot")
            .field("id", &self.id)
            .field("size", &self.target_size())
            .field("displayed", &self.view.lock().current)
            .finish()
    }
}
