//! Per-slot image request coordinator.
//!
//! Implements a three-tier lookup: Memory -> Disk -> Network. Every
//! request is bound to one display slot; binding a new request bumps the
//! slot's generation, and results from older generations are dropped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::entities::{
    CacheKey, CachedImage, ImageSource, LoadOutcome, LoadSpec, RequestState, RequestTag,
    SlotContent, SlotId, TargetSize, Transition,
};
use crate::domain::errors::ImageError;
use crate::domain::ports::{CacheResult, DisplaySlot, ImageCachePort, ImageTransport};

use super::disk_cache::{DEFAULT_CACHE_DIR_NAME, DEFAULT_VALIDITY, DiskImageCache};
use super::fetcher::{ImageFetcher, decode_cached, encode_for_disk};
use super::memory_cache::{CacheStats, DEFAULT_MEMORY_BUDGET, MemoryImageCache};

/// Configuration for the image loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLoaderConfig {
    /// Byte budget of the memory tier.
    pub memory_budget_bytes: usize,
    /// Age after which a disk entry is a miss, in seconds.
    pub disk_validity_secs: u64,
    /// Subdirectory of the cache root owned by the disk tier.
    pub cache_dir_name: String,
    /// Maximum concurrent downloads.
    pub max_concurrent_downloads: usize,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds.
    pub timeout_secs: u64,
    /// Fade-in duration in milliseconds.
    pub fade_duration_ms: u64,
}

impl Default for ImageLoaderConfig {
    fn default() -> Self {
        Self {
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET,
            disk_validity_secs: DEFAULT_VALIDITY.as_secs(),
            cache_dir_name: DEFAULT_CACHE_DIR_NAME.to_string(),
            max_concurrent_downloads: 4,
            connect_timeout_secs: 10,
            timeout_secs: 30,
            fade_duration_ms: 200,
        }
    }
}

impl ImageLoaderConfig {
    /// Disk validity window.
    #[must_use]
    pub const fn disk_validity(&self) -> Duration {
        Duration::from_secs(self.disk_validity_secs)
    }

    /// Fade-in duration.
    #[must_use]
    pub const fn fade_duration(&self) -> Duration {
        Duration::from_millis(self.fade_duration_ms)
    }
}

/// Request bookkeeping for one slot.
///
/// The generation is published on a watch channel so requests parked on
/// the slot's layout wake up when they are superseded. Dropping the entry
/// closes the channel, which parked requests treat the same way.
#[derive(Debug)]
struct SlotEntry {
    generation: watch::Sender<u64>,
    key: Option<CacheKey>,
    state: RequestState,
}

impl Default for SlotEntry {
    fn default() -> Self {
        Self {
            generation: watch::channel(0).0,
            key: None,
            state: RequestState::Idle,
        }
    }
}

impl SlotEntry {
    fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    fn advance(&self, generation: u64) {
        self.generation.send_replace(generation);
    }
}

/// How waiting for the decode target ended.
enum Target {
    Ready(TargetSize),
    Unavailable,
    Superseded,
}

/// Loads images into display slots.
///
/// Cloning is cheap and every clone shares the same caches, so one
/// instance per process is created at the composition root and handed
/// to consumers.
#[derive(Clone)]
pub struct ImageLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    memory_cache: MemoryImageCache,
    disk_cache: Arc<DiskImageCache>,
    fetcher: ImageFetcher,
    slots: Mutex<HashMap<SlotId, Arc<Mutex<SlotEntry>>>>,
    generations: AtomicU64,
    downloads: Semaphore,
    runtime: Handle,
    config: ImageLoaderConfig,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader whose disk tier lives under `cache_root`.
    ///
    /// Must be called from within a tokio runtime; background work is
    /// spawned onto that runtime even when requests are started from
    /// other threads.
    ///
    /// # Errors
    /// Returns error if there is no current runtime or the disk cache
    /// directory cannot be created.
    pub fn new(
        config: ImageLoaderConfig,
        transport: Arc<dyn ImageTransport>,
        cache_root: &Path,
    ) -> CacheResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| ImageError::io(format!("No async runtime available: {e}")))?;
        let disk_cache = Arc::new(DiskImageCache::new(
            cache_root,
            &config.cache_dir_name,
            config.disk_validity(),
        )?);

        info!(
            budget = config.memory_budget_bytes,
            cache_dir = %disk_cache.cache_dir().display(),
            "Image loader ready"
        );

        Ok(Self {
            inner: Arc::new(LoaderInner {
                memory_cache: MemoryImageCache::new(config.memory_budget_bytes),
                disk_cache,
                fetcher: ImageFetcher::new(transport),
                slots: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(1),
                downloads: Semaphore::new(config.max_concurrent_downloads.max(1)),
                runtime,
                config,
            }),
        })
    }

    /// Starts building a request for `url`.
    pub fn load(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder {
            loader: self,
            spec: LoadSpec::new(url),
        }
    }

    /// Clears both cache tiers. In-flight requests are not cancelled and
    /// may repopulate the caches when they finish.
    ///
    /// # Errors
    /// Returns error if the disk cache directory cannot be read.
    pub fn invalidate_cache(&self) -> CacheResult<()> {
        self.inner.memory_cache.clear()?;
        self.inner.disk_cache.clear()?;
        info!("Cleared all image caches");
        Ok(())
    }

    /// Cancels the request bound to `slot`, if any. Its result will be
    /// discarded; an in-flight download still runs to completion.
    pub fn cancel(&self, slot: SlotId) {
        let Some(entry) = self.inner.slots.lock().get(&slot).cloned() else {
            return;
        };
        let mut entry = entry.lock();
        entry.advance(self.inner.next_generation());
        if entry.state.is_pending() {
            debug!(slot = %slot, "Cancelled image request");
        }
        entry.state = RequestState::Cancelled;
    }

    /// Forgets `slot`. Any request bound to it is discarded on completion.
    pub fn release_slot(&self, slot: SlotId) {
        if self.inner.slots.lock().remove(&slot).is_some() {
            debug!(slot = %slot, "Released slot");
        }
    }

    /// Returns true while `handle` is the request bound to its slot.
    #[must_use]
    pub fn is_active(&self, handle: &RequestHandle) -> bool {
        self.inner.is_current(&handle.tag)
    }

    /// State of the request currently bound to `slot`.
    #[must_use]
    pub fn slot_state(&self, slot: SlotId) -> RequestState {
        self.inner
            .slots
            .lock()
            .get(&slot)
            .map_or(RequestState::Idle, |entry| entry.lock().state)
    }

    /// Returns the memory tier.
    #[must_use]
    pub fn memory_cache(&self) -> &MemoryImageCache {
        &self.inner.memory_cache
    }

    /// Returns the disk tier.
    #[must_use]
    pub fn disk_cache(&self) -> &DiskImageCache {
        &self.inner.disk_cache
    }

    /// Returns memory cache statistics.
    #[must_use]
    pub fn memory_cache_stats(&self) -> CacheStats {
        self.inner.memory_cache.stats()
    }

    fn start(&self, spec: LoadSpec, slot: Arc<dyn DisplaySlot>) -> RequestHandle {
        let slot_id = slot.id();
        let entry = self.inner.slot_entry(slot_id);
        let mut state = entry.lock();

        if state.state.is_pending() {
            debug!(slot = %slot_id, previous = ?state.key, "Superseding in-flight request");
        }
        state.advance(self.inner.next_generation());
        state.key = Some(spec.key.clone());
        let tag = RequestTag {
            slot: slot_id,
            key: spec.key.clone(),
            generation: state.generation(),
        };
        let superseded = state.generation.subscribe();

        slot.show(spec.placeholder_content());
        state.state = RequestState::PlaceholderShown;

        if let Some(image) = self.inner.memory_cache.get(&spec.key) {
            state.state = RequestState::MemoryHit;
            slot.show(self.inner.image_content(&spec, image, ImageSource::MemoryCache));
            state.state = RequestState::Delivered;
            debug!(slot = %slot_id, key = %spec.key, source = "memory", "Image delivered");
            return RequestHandle {
                tag,
                completion: Completion::Ready(LoadOutcome::Delivered(ImageSource::MemoryCache)),
            };
        }
        drop(state);

        let inner = self.inner.clone();
        let task_tag = tag.clone();
        let join = self
            .inner
            .runtime
            .spawn(async move { inner.run(spec, slot, task_tag, superseded).await });

        RequestHandle {
            tag,
            completion: Completion::Pending(join),
        }
    }
}

impl LoaderInner {
    /// Generations are unique across slots, so a released and re-created
    /// slot entry can never match a tag issued before the release.
    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }

    fn slot_entry(&self, slot: SlotId) -> Arc<Mutex<SlotEntry>> {
        self.slots.lock().entry(slot).or_default().clone()
    }

    /// Runs `f` on the slot entry if `tag` is still its current request.
    fn with_current(&self, tag: &RequestTag, f: impl FnOnce(&mut SlotEntry)) -> bool {
        let Some(entry) = self.slots.lock().get(&tag.slot).cloned() else {
            return false;
        };
        let mut entry = entry.lock();
        if entry.generation() != tag.generation {
            return false;
        }
        f(&mut entry);
        true
    }

    fn is_current(&self, tag: &RequestTag) -> bool {
        self.with_current(tag, |_| {})
    }

    fn transition(&self, tag: &RequestTag, state: RequestState) {
        self.with_current(tag, |entry| entry.state = state);
    }

    fn image_content(
        &self,
        spec: &LoadSpec,
        image: CachedImage,
        source: ImageSource,
    ) -> SlotContent {
        let transition = if spec.fade_in {
            Transition::FadeIn(self.config.fade_duration())
        } else {
            Transition::None
        };
        SlotContent::Image {
            image,
            source,
            transition,
        }
    }

    async fn run(
        self: Arc<Self>,
        spec: LoadSpec,
        slot: Arc<dyn DisplaySlot>,
        tag: RequestTag,
        mut superseded: watch::Receiver<u64>,
    ) -> LoadOutcome {
        if let Some(image) = self.read_disk(&spec.key).await {
            self.transition(&tag, RequestState::DiskHit);
            if let Err(e) = self.memory_cache.put(&spec.key, image.clone()) {
                warn!(key = %spec.key, error = %e, "Failed to cache in memory");
            }
            return self.deliver_image(slot.as_ref(), &tag, &spec, image, ImageSource::DiskCache);
        }

        if !self.is_current(&tag) {
            debug!(slot = %tag.slot, key = %tag.key, "Request superseded before download");
            return LoadOutcome::Discarded;
        }

        let resolved = Self::resolve_target(&spec, slot.as_ref(), &tag, &mut superseded).await;
        let target = match resolved {
            Target::Ready(size) => size,
            Target::Unavailable => return LoadOutcome::Skipped,
            Target::Superseded => {
                debug!(
                    slot = %tag.slot,
                    key = %tag.key,
                    "Request superseded while waiting for layout"
                );
                return LoadOutcome::Discarded;
            }
        };

        if !self.is_current(&tag) {
            debug!(slot = %tag.slot, key = %tag.key, "Request superseded while waiting for layout");
            return LoadOutcome::Discarded;
        }

        self.transition(&tag, RequestState::Downloading);
        let fetched = {
            let _permit = self.downloads.acquire().await.ok();
            debug!(slot = %tag.slot, url = %spec.url, target = %target, "Downloading image");
            self.fetcher.fetch(&spec.url, target).await
        };

        match fetched {
            Ok(fetched) => {
                self.transition(&tag, RequestState::Decoded);
                self.populate(&spec.key, &fetched.image).await;
                self.transition(&tag, RequestState::CachesPopulated);
                self.deliver_image(slot.as_ref(), &tag, &spec, fetched.image, ImageSource::Network)
            }
            Err(e) => {
                warn!(url = %spec.url, error = %e, "Failed to load image");
                self.transition(&tag, RequestState::Failed);
                self.deliver_error(slot.as_ref(), &tag, &spec)
            }
        }
    }

    /// Picks the decode target: explicit size, current layout, or the
    /// first laid-out size the slot reports. Waiting for layout ends early
    /// once the slot moves past `tag`'s generation or is released.
    async fn resolve_target(
        spec: &LoadSpec,
        slot: &dyn DisplaySlot,
        tag: &RequestTag,
        superseded: &mut watch::Receiver<u64>,
    ) -> Target {
        if let Some(size) = spec.target_size {
            if !size.is_laid_out() {
                warn!(
                    url = %spec.url,
                    size = %size,
                    "Target size has a zero dimension, skipping download"
                );
                return Target::Unavailable;
            }
            return Target::Ready(size);
        }

        let current = slot.target_size();
        if current.is_laid_out() {
            return Target::Ready(current);
        }

        debug!(slot = %slot.id(), "Waiting for slot layout");
        let mut layout = slot.layout();
        let generation = tag.generation;
        tokio::select! {
            laid_out = layout.wait_for(|size| size.is_laid_out()) => {
                match laid_out.map(|size| *size) {
                    Ok(size) => Target::Ready(size),
                    Err(_) => {
                        warn!(
                            slot = %slot.id(),
                            url = %spec.url,
                            "Slot went away before layout, skipping download"
                        );
                        Target::Unavailable
                    }
                }
            }
            _ = superseded.wait_for(|current| *current != generation) => Target::Superseded,
        }
    }

    async fn read_disk(&self, key: &CacheKey) -> Option<CachedImage> {
        let disk = self.disk_cache.clone();
        let lookup_key = key.clone();
        let result = tokio::task::spawn_blocking(move || {
            disk.get(&lookup_key).map(|bytes| decode_cached(&bytes))
        })
        .await;

        match result {
            Ok(Some(Ok(image))) => {
                debug!(key = %key, "Decoded image from disk cache");
                Some(image)
            }
            Ok(Some(Err(e))) => {
                warn!(key = %key, error = %e, "Failed to decode cached image");
                None
            }
            Ok(None) => None,
            Err(e) => {
                error!(key = %key, error = %e, "Disk read task panicked");
                None
            }
        }
    }

    /// Writes the disk tier, then the memory tier. Disk failures are
    /// logged and otherwise ignored.
    async fn populate(&self, key: &CacheKey, image: &CachedImage) {
        let disk = self.disk_cache.clone();
        let write_key = key.clone();
        let pixels = image.image().clone();
        let written = tokio::task::spawn_blocking(move || {
            let bytes = encode_for_disk(&pixels)?;
            disk.put(&write_key, bytes)
        })
        .await;

        match written {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(key = %key, error = %e, "Failed to cache to disk"),
            Err(e) => error!(key = %key, error = %e, "Disk write task panicked"),
        }

        if let Err(e) = self.memory_cache.put(key, image.clone()) {
            warn!(key = %key, error = %e, "Failed to cache in memory");
        }
    }

    fn deliver_image(
        &self,
        slot: &dyn DisplaySlot,
        tag: &RequestTag,
        spec: &LoadSpec,
        image: CachedImage,
        source: ImageSource,
    ) -> LoadOutcome {
        let content = self.image_content(spec, image, source);
        let delivered = self.with_current(tag, |entry| {
            slot.show(content);
            entry.state = RequestState::Delivered;
        });

        if delivered {
            debug!(slot = %tag.slot, key = %tag.key, source = %source, "Image delivered");
            LoadOutcome::Delivered(source)
        } else {
            debug!(slot = %tag.slot, key = %tag.key, "Slot reassigned, discarding stale result");
            LoadOutcome::Discarded
        }
    }

    fn deliver_error(
        &self,
        slot: &dyn DisplaySlot,
        tag: &RequestTag,
        spec: &LoadSpec,
    ) -> LoadOutcome {
        let shown = self.with_current(tag, |entry| {
            if let Some(error_image) = &spec.error_image {
                slot.show(SlotContent::Error(error_image.clone()));
            }
            entry.state = RequestState::ErrorShown;
        });

        if shown {
            LoadOutcome::ErrorShown
        } else {
            debug!(slot = %tag.slot, key = %tag.key, "Slot reassigned, discarding stale failure");
            LoadOutcome::Discarded
        }
    }
}

/// Chainable configuration of a single request.
#[must_use = "a request does nothing until `into` is called"]
pub struct RequestBuilder<'a> {
    loader: &'a ImageLoader,
    spec: LoadSpec,
}

impl RequestBuilder<'_> {
    /// Shows `image` while the request resolves.
    pub fn with_placeholder(mut self, image: CachedImage) -> Self {
        self.spec.placeholder = Some(image);
        self
    }

    /// Shows `image` if the request fails.
    pub fn with_error_image(mut self, image: CachedImage) -> Self {
        self.spec.error_image = Some(image);
        self
    }

    /// Fades the delivered image in.
    pub fn with_fade_in_animation(mut self) -> Self {
        self.spec.fade_in = true;
        self
    }

    /// Decodes for this size instead of the slot's layout size.
    pub fn with_target_size(mut self, width: u32, height: u32) -> Self {
        self.spec.target_size = Some(TargetSize::new(width, height));
        self
    }

    /// Binds the request to `slot` and starts it.
    ///
    /// The placeholder is shown and a memory hit is delivered before this
    /// returns; everything else happens in the background.
    pub fn into<S: DisplaySlot + 'static>(self, slot: Arc<S>) -> RequestHandle {
        let slot: Arc<dyn DisplaySlot> = slot;
        self.loader.start(self.spec, slot)
    }
}

impl std::fmt::Debug for RequestBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Completion {
    Ready(LoadOutcome),
    Pending(JoinHandle<LoadOutcome>),
}

/// A started request.
#[derive(Debug)]
pub struct RequestHandle {
    tag: RequestTag,
    completion: Completion,
}

impl RequestHandle {
    /// Slot the request is bound to.
    #[must_use]
    pub const fn slot(&self) -> SlotId {
        self.tag.slot
    }

    /// Key of the requested image.
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.tag.key
    }

    /// Returns true if the request finished before `into` returned.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.completion, Completion::Ready(_))
    }

    /// Waits for the request to finish.
    pub async fn finished(self) -> LoadOutcome {
        match self.completion {
            Completion::Ready(outcome) => outcome,
            Completion::Pending(join) => join.await.unwrap_or_else(|e| {
                error!(
                    slot = %self.tag.slot,
                    key = %self.tag.key,
                    error = %e,
                    "Image request task failed"
                );
                LoadOutcome::Discarded
            }),
        }
    }
}
