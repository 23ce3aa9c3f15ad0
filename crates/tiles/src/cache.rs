//! Torus-mapped cache of rasterized tiles.
//!
//! Slots hold immutable pixel buffers. Refreshing a slot paints a private
//! copy and swaps it in under the slot lock, so readers on either thread
//! only ever see complete tiles and never wait for a paint in progress.
//! A per-slot dirty epoch rejects commits that raced with a newer mark.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::{ArcSwap, ArcSwapOption};
use model::{Point, Rect, TILE_BYTES, tile_pixel_region};

use crate::config::{TileCacheConfig, TileCacheConfigError};
use crate::maintenance::MaintenanceWorker;
use crate::raster::{Rasterizer, TileCanvas};
use crate::torus::TorusMapping;
use crate::version::{Version, VersionTag};

/// Shared, immutable RGBA8 content of one tile.
pub type TilePixels = Arc<[u8]>;

pub type TileChangedCallback = Box<dyn Fn(Point) + Send + Sync>;

/// Cache state of a tile, ordered by precedence.
///
/// Marking a tile never lowers its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TileState {
    Clean,
    NeedsUpdate,
    NeedsRedraw,
    Invalid,
}

impl TileState {
    pub fn escalate(self, requested: TileState) -> TileState {
        self.max(requested)
    }

    pub fn is_clean(self) -> bool {
        self == TileState::Clean
    }
}

#[derive(Debug)]
struct TileSlot {
    pixels: TilePixels,
    state: TileState,
    dirty_epoch: u64,
    changed: bool,
}

/// Who refreshes a slot, which decides what it may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshMode {
    /// `get_tile` on the interactive thread: never paints `Invalid` tiles.
    Interactive,
    /// The maintenance thread; the commit is dropped when the mapping moved
    /// away from `version`.
    Background { version: Version },
}

#[derive(Debug)]
pub(crate) enum RefreshOutcome {
    AlreadyClean(TilePixels),
    Committed(TilePixels),
    /// Painted, but a newer mark or mapping change arrived meanwhile; the
    /// slot keeps its newer state.
    Superseded(TilePixels),
    NotReady,
}

pub(crate) struct CacheShared {
    pub(crate) config: TileCacheConfig,
    pub(crate) mapping: ArcSwap<TorusMapping>,
    pub(crate) version: VersionTag,
    pub(crate) shutdown: AtomicBool,
    slots: Box<[Mutex<TileSlot>]>,
    dirty_slots: AtomicUsize,
    background: AtomicBool,
    tile_changed: ArcSwapOption<TileChangedCallback>,
}

impl CacheShared {
    fn slot(&self, slot_index: usize) -> MutexGuard<'_, TileSlot> {
        self.slots[slot_index]
            .lock()
            .expect("tile slot lock poisoned")
    }

    pub(crate) fn dirty_tile_count(&self) -> usize {
        self.dirty_slots.load(Ordering::Acquire)
    }

    pub(crate) fn slot_state(&self, slot_index: usize) -> TileState {
        self.slot(slot_index).state
    }

    /// Escalate a slot. Without a maintenance thread nothing would ever clean
    /// an `Invalid` slot, so those are downgraded to `NeedsRedraw`.
    fn mark_slot(&self, slot_index: usize, requested: TileState) {
        let has_background = self.background.load(Ordering::Acquire);
        let requested = if requested == TileState::Invalid && !has_background {
            TileState::NeedsRedraw
        } else {
            requested
        };

        let mut slot = self.slot(slot_index);
        slot.dirty_epoch = slot.dirty_epoch.wrapping_add(1);
        if slot.state.is_clean() && !requested.is_clean() {
            self.dirty_slots.fetch_add(1, Ordering::AcqRel);
        }
        slot.state = slot.state.escalate(requested);
    }

    /// Bring one slot up to date with `rasterizer`.
    ///
    /// The paint runs without holding the slot lock, on a copy of the
    /// current buffer for incremental updates or on a cleared buffer for full
    /// redraws.
    pub(crate) fn refresh_slot(
        &self,
        tile: Point,
        slot_index: usize,
        rasterizer: &mut dyn Rasterizer,
        mode: RefreshMode,
    ) -> RefreshOutcome {
        let (state, epoch, current) = {
            let slot = self.slot(slot_index);
            if slot.state.is_clean() {
                return RefreshOutcome::AlreadyClean(slot.pixels.clone());
            }
            if slot.state == TileState::Invalid && mode == RefreshMode::Interactive {
                return RefreshOutcome::NotReady;
            }
            (slot.state, slot.dirty_epoch, slot.pixels.clone())
        };

        let incremental = state == TileState::NeedsUpdate;
        let mut buffer = if incremental {
            current.to_vec()
        } else {
            vec![0; TILE_BYTES]
        };
        drop(current);

        let region = tile_pixel_region(tile);
        log::trace!(
            "rasterizing tile {tile} ({state:?}, incremental: {incremental}) into slot {slot_index}"
        );
        {
            let mut canvas = TileCanvas::new(&mut buffer, region);
            if !incremental {
                rasterizer.set_incremental(false);
            }
            rasterizer.draw(&mut canvas, region);
            if !incremental {
                rasterizer.set_incremental(true);
            }
        }
        let painted: TilePixels = Arc::from(buffer);

        let mut slot = self.slot(slot_index);
        let mapping_moved = match mode {
            RefreshMode::Interactive => false,
            RefreshMode::Background { version } => self.version.changed(version),
        };
        if slot.dirty_epoch != epoch || mapping_moved {
            log::trace!("tile {tile} changed while rasterizing; keeping newer state");
            return RefreshOutcome::Superseded(painted);
        }

        slot.pixels = painted.clone();
        if !slot.state.is_clean() {
            slot.state = TileState::Clean;
            self.dirty_slots.fetch_sub(1, Ordering::AcqRel);
        }
        if matches!(mode, RefreshMode::Background { .. }) {
            slot.changed = true;
        }
        RefreshOutcome::Committed(painted)
    }

    pub(crate) fn notify_tile_changed(&self, tile: Point) {
        let callback = self.tile_changed.load();
        if let Some(callback) = &*callback {
            log::trace!("invoking tile changed callback for {tile}");
            (**callback)(tile);
        }
    }
}

/// Cache of `W x H` rasterized tiles around a movable window.
///
/// All methods are meant to be called from one interactive thread. An
/// optional maintenance thread cleans dirty tiles in the background once a
/// background rasterizer is installed.
pub struct TileCache {
    shared: Arc<CacheShared>,
    worker: Option<MaintenanceWorker>,
}

impl TileCache {
    pub fn new(config: TileCacheConfig) -> Result<Self, TileCacheConfigError> {
        config.validate()?;

        log::debug!(
            "creating {}x{} tile cache around tile {}",
            config.width,
            config.height,
            config.center
        );

        let blank: TilePixels = Arc::from(vec![0; TILE_BYTES]);
        let slots = (0..config.slot_count())
            .map(|_| {
                Mutex::new(TileSlot {
                    pixels: blank.clone(),
                    state: TileState::Clean,
                    dirty_epoch: 0,
                    changed: false,
                })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let shared = Arc::new(CacheShared {
            config,
            mapping: ArcSwap::from_pointee(TorusMapping::new(config.width, config.height)),
            version: VersionTag::new(),
            shutdown: AtomicBool::new(false),
            slots,
            dirty_slots: AtomicUsize::new(0),
            background: AtomicBool::new(false),
            tile_changed: ArcSwapOption::empty(),
        });

        let mut cache = Self {
            shared,
            worker: None,
        };
        cache.reset(config.center);
        Ok(cache)
    }

    pub fn config(&self) -> TileCacheConfig {
        self.shared.config
    }

    /// Snapshot of the current logical-to-physical mapping.
    pub fn mapping(&self) -> TorusMapping {
        **self.shared.mapping.load()
    }

    /// Logical tiles the cache currently represents.
    pub fn region(&self) -> Rect {
        self.mapping().region()
    }

    pub fn dirty_tile_count(&self) -> usize {
        self.shared.dirty_tile_count()
    }

    pub fn has_background_rasterizer(&self) -> bool {
        self.worker.is_some()
    }

    /// Center the window on `center` and invalidate every slot.
    pub fn reset(&mut self, center: Point) {
        let half = Point::new(
            (self.shared.config.width / 2) as i32,
            (self.shared.config.height / 2) as i32,
        );
        self.update_mapping(|mapping| mapping.reset(center - half));

        log::debug!("tile cache reset, region is now {}", self.region());

        for slot_index in 0..self.shared.slots.len() {
            self.shared.mark_slot(slot_index, TileState::Invalid);
        }
        self.wake_worker();
    }

    /// Move the window by whole tiles, x steps first.
    ///
    /// Each unit step invalidates only the column or row entering the
    /// window, so the cost grows with the distance up to one window width.
    pub fn shift(&mut self, delta: Point) {
        log::trace!("shifting tile cache by {delta}");

        if delta.x.unsigned_abs() >= self.shared.config.width
            || delta.y.unsigned_abs() >= self.shared.config.height
        {
            // Every slot would enter the window at least once.
            self.update_mapping(|mapping| mapping.shift(delta));
            for slot_index in 0..self.shared.slots.len() {
                self.shared.mark_slot(slot_index, TileState::Invalid);
            }
            self.wake_worker();
            log::trace!("tile cache region is now {}", self.region());
            return;
        }

        let step_x = Point::new(delta.x.signum(), 0);
        for _ in 0..delta.x.unsigned_abs() {
            self.shift_step(step_x);
        }
        let step_y = Point::new(0, delta.y.signum());
        for _ in 0..delta.y.unsigned_abs() {
            self.shift_step(step_y);
        }

        log::trace!("tile cache region is now {}", self.region());
    }

    fn shift_step(&mut self, step: Point) {
        self.update_mapping(|mapping| mapping.shift(step));

        let mapping = self.mapping();
        let region = mapping.region();
        let entering = match (step.x, step.y) {
            (1, 0) => Rect::new(region.max_x - 1, region.min_y, region.max_x, region.max_y),
            (-1, 0) => Rect::new(region.min_x, region.min_y, region.min_x + 1, region.max_y),
            (0, 1) => Rect::new(region.min_x, region.max_y - 1, region.max_x, region.max_y),
            (0, -1) => Rect::new(region.min_x, region.min_y, region.max_x, region.min_y + 1),
            _ => unreachable!("shift step must be a unit vector"),
        };
        for tile in entering.points() {
            let slot_index = mapping.slot_index(mapping.map(tile));
            self.shared.mark_slot(slot_index, TileState::Invalid);
        }
        self.wake_worker();
    }

    fn update_mapping(&mut self, update: impl FnOnce(&mut TorusMapping)) {
        let _guard = self.shared.version.lock();
        let mut next = **self.shared.mapping.load();
        update(&mut next);
        self.shared.mapping.store(Arc::new(next));
    }

    /// Escalate a tile's state. Tiles outside the window are ignored, which
    /// happens routinely while panning.
    pub fn mark_dirty(&self, tile: Point, state: TileState) {
        let mapping = self.mapping();
        if !mapping.contains(tile) {
            log::trace!("tile {tile} is not in the cache, ignoring {state:?}");
            return;
        }
        log::trace!("marking tile {tile} as {state:?}");
        self.shared
            .mark_slot(mapping.slot_index(mapping.map(tile)), state);
        self.wake_worker();
    }

    pub fn state(&self, tile: Point) -> Option<TileState> {
        let mapping = self.mapping();
        if !mapping.contains(tile) {
            return None;
        }
        Some(self.shared.slot_state(mapping.slot_index(mapping.map(tile))))
    }

    /// Pixels of `tile`, refreshed on this thread if they are stale.
    ///
    /// Returns `None` for tiles that are `Invalid` (left to the maintenance
    /// thread) or outside the window. `NeedsUpdate` and `NeedsRedraw` tiles
    /// are rasterized synchronously, which blocks the caller for one tile.
    pub fn get_tile(&self, tile: Point, rasterizer: &mut dyn Rasterizer) -> Option<TilePixels> {
        let mapping = self.mapping();
        if !mapping.contains(tile) {
            return None;
        }
        let slot_index = mapping.slot_index(mapping.map(tile));
        match self
            .shared
            .refresh_slot(tile, slot_index, rasterizer, RefreshMode::Interactive)
        {
            RefreshOutcome::AlreadyClean(pixels)
            | RefreshOutcome::Committed(pixels)
            | RefreshOutcome::Superseded(pixels) => Some(pixels),
            RefreshOutcome::NotReady => {
                log::trace!("tile {tile} is not ready yet");
                None
            }
        }
    }

    /// Whether the maintenance thread replaced the tile's pixels since the
    /// last `acknowledge_change`.
    pub fn was_changed(&self, tile: Point) -> bool {
        let mapping = self.mapping();
        if !mapping.contains(tile) {
            return false;
        }
        self.shared
            .slot(mapping.slot_index(mapping.map(tile)))
            .changed
    }

    /// Consume the change flag. Call before re-reading the tile so that a
    /// background update landing in between is not lost.
    pub fn acknowledge_change(&self, tile: Point) {
        let mapping = self.mapping();
        if !mapping.contains(tile) {
            return;
        }
        self.shared
            .slot(mapping.slot_index(mapping.map(tile)))
            .changed = false;
    }

    /// Install the rasterizer of the maintenance thread, starting the thread
    /// on first use.
    pub fn set_background_rasterizer(&mut self, rasterizer: Box<dyn Rasterizer + Send>) {
        match &self.worker {
            Some(worker) => worker.replace_rasterizer(rasterizer),
            None => {
                self.shared.background.store(true, Ordering::Release);
                self.worker = Some(MaintenanceWorker::spawn(self.shared.clone(), rasterizer));
            }
        }
        self.wake_worker();
    }

    /// Register a callback for tiles cleaned by the maintenance thread. It
    /// runs on that thread and must return quickly.
    pub fn set_tile_changed_callback<F>(&self, callback: F)
    where
        F: Fn(Point) + Send + Sync + 'static,
    {
        self.shared
            .tile_changed
            .store(Some(Arc::new(Box::new(callback) as TileChangedCallback)));
    }

    pub fn clear_tile_changed_callback(&self) {
        self.shared.tile_changed.store(None);
    }

    fn wake_worker(&self) {
        if let Some(worker) = &self.worker {
            if self.shared.dirty_tile_count() > 0 {
                worker.wake();
            }
        }
    }
}

impl fmt::Debug for TileCache {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TileCache")
            .field("config", &self.shared.config)
            .field("region", &self.region())
            .field("dirty_tiles", &self.dirty_tile_count())
            .field("background", &self.worker.is_some())
            .finish()
    }
}

impl Drop for TileCache {
    fn drop(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        log::debug!("stopping tile maintenance thread");
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.tile_changed.store(None);
        worker.shutdown();
        log::debug!("tile maintenance thread stopped");
    }
}
