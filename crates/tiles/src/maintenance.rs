//! Background thread that cleans dirty tiles, nearest to the window center
//! first.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded, select, unbounded};
use model::Point;

use crate::cache::{CacheShared, RefreshMode, RefreshOutcome};
use crate::raster::Rasterizer;
use crate::version::{Version, VersionTag};

pub(crate) enum WorkerControl {
    SetRasterizer(Box<dyn Rasterizer + Send>),
    Shutdown,
}

pub(crate) struct MaintenanceWorker {
    // Capacity 1: repeated wake-ups while the worker is busy collapse into one.
    wake_sender: Sender<()>,
    control_sender: Sender<WorkerControl>,
    thread: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    pub(crate) fn spawn(shared: Arc<CacheShared>, rasterizer: Box<dyn Rasterizer + Send>) -> Self {
        let (wake_sender, wake_receiver) = bounded(1);
        let (control_sender, control_receiver) = unbounded();
        let thread = std::thread::Builder::new()
            .name("tile-maintenance".to_owned())
            .spawn(move || run(shared, rasterizer, wake_receiver, control_receiver))
            .expect("spawn tile maintenance thread");
        log::debug!("tile maintenance thread spawned");
        Self {
            wake_sender,
            control_sender,
            thread: Some(thread),
        }
    }

    pub(crate) fn wake(&self) {
        match self.wake_sender.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                log::warn!("tile maintenance thread is gone; dirty tiles stay dirty")
            }
        }
    }

    pub(crate) fn replace_rasterizer(&self, rasterizer: Box<dyn Rasterizer + Send>) {
        if self
            .control_sender
            .send(WorkerControl::SetRasterizer(rasterizer))
            .is_err()
        {
            log::warn!("tile maintenance thread is gone; background rasterizer dropped");
        }
    }

    /// Stop the thread and wait for it. A tile being rasterized is finished
    /// first, but its result is not reported.
    pub(crate) fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.control_sender.send(WorkerControl::Shutdown);
        if thread.join().is_err() {
            log::error!("tile maintenance thread panicked");
        }
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    shared: Arc<CacheShared>,
    mut rasterizer: Box<dyn Rasterizer + Send>,
    wake_receiver: Receiver<()>,
    control_receiver: Receiver<WorkerControl>,
) {
    'wait: loop {
        select! {
            recv(wake_receiver) -> message => {
                if message.is_err() {
                    break 'wait;
                }
            }
            recv(control_receiver) -> message => match message {
                Ok(WorkerControl::SetRasterizer(next)) => {
                    log::debug!("tile maintenance thread switched rasterizer");
                    rasterizer = next;
                }
                Ok(WorkerControl::Shutdown) | Err(_) => break 'wait,
            },
        }

        while shared.dirty_tile_count() > 0 {
            if shared.shutdown.load(Ordering::Acquire) {
                break 'wait;
            }
            match control_receiver.try_recv() {
                Ok(WorkerControl::SetRasterizer(next)) => rasterizer = next,
                Ok(WorkerControl::Shutdown) | Err(TryRecvError::Disconnected) => break 'wait,
                Err(TryRecvError::Empty) => {}
            }

            let picked = clean_dirty_tiles(&shared, rasterizer.as_mut(), shared.config.batch_size);
            if picked == 0 {
                // Nothing reachable is dirty, or the mapping is being
                // rewritten and its writer wakes us once it is done.
                break;
            }
        }
    }
    log::debug!("tile maintenance thread exiting");
}

/// Work on up to `limit` dirty tiles and return how many were picked.
///
/// A pick counts even when its commit lost a race: the interactive thread
/// may have painted the tile first or moved the mapping. Such races never
/// leave a wake-up behind, so the caller must keep searching until nothing
/// is found.
pub(crate) fn clean_dirty_tiles(
    shared: &CacheShared,
    rasterizer: &mut dyn Rasterizer,
    limit: usize,
) -> usize {
    let mut picked = 0;
    for _ in 0..limit {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        let Some(candidate) = find_dirty_tile(shared) else {
            break;
        };
        picked += 1;
        if shared.version.changed(candidate.version) {
            log::trace!("mapping moved before tile {} was painted", candidate.tile);
            continue;
        }
        let mode = RefreshMode::Background {
            version: candidate.version,
        };
        match shared.refresh_slot(candidate.tile, candidate.slot_index, rasterizer, mode) {
            RefreshOutcome::Committed(_) => {
                if !shared.shutdown.load(Ordering::Acquire) {
                    shared.notify_tile_changed(candidate.tile);
                }
            }
            RefreshOutcome::AlreadyClean(_) | RefreshOutcome::Superseded(_) => {}
            RefreshOutcome::NotReady => unreachable!("background refresh paints invalid tiles"),
        }
    }
    picked
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DirtyTile {
    pub(crate) tile: Point,
    pub(crate) slot_index: usize,
    pub(crate) version: Version,
}

/// Nearest non-clean tile to the window center, searching outward ring by
/// ring. Gives up while the mapping is being rewritten.
pub(crate) fn find_dirty_tile(shared: &CacheShared) -> Option<DirtyTile> {
    let version = shared.version.version();
    if VersionTag::is_locked(version) {
        return None;
    }
    let mapping = shared.mapping.load_full();
    let region = mapping.region();
    let center = mapping.center();
    let max_radius = (mapping.width().max(mapping.height()) / 2) as i32;

    for radius in 0..=max_radius {
        for offset in RingWalk::new(radius) {
            let tile = center + offset;
            if !region.contains(tile) {
                continue;
            }
            let slot_index = mapping.slot_index(mapping.map(tile));
            if !shared.slot_state(slot_index).is_clean() {
                return Some(DirtyTile {
                    tile,
                    slot_index,
                    version,
                });
            }
        }
    }
    None
}

/// Offsets at Chebyshev distance `radius`, walking the top edge left to
/// right, then the right edge down, the bottom edge right to left and the
/// left edge up.
#[derive(Debug, Clone)]
pub(crate) struct RingWalk {
    radius: i32,
    index: i32,
    len: i32,
}

impl RingWalk {
    pub(crate) fn new(radius: i32) -> Self {
        assert!(radius >= 0, "ring radius must not be negative");
        Self {
            radius,
            index: 0,
            len: if radius == 0 { 1 } else { 8 * radius },
        }
    }
}

impl Iterator for RingWalk {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        if self.index >= self.len {
            return None;
        }
        let r = self.radius;
        let i = self.index;
        self.index += 1;
        let offset = if i <= 2 * r {
            Point::new(-r + i, -r)
        } else if i <= 4 * r {
            Point::new(r, -r + (i - 2 * r))
        } else if i <= 6 * r {
            Point::new(r - (i - 4 * r), r)
        } else {
            Point::new(-r, r - (i - 6 * r))
        };
        Some(offset)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.len - self.index).max(0) as usize;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::RingWalk;
    use model::Point;

    #[test]
    fn ring_zero_is_center_only() {
        assert_eq!(RingWalk::new(0).collect::<Vec<_>>(), vec![Point::ZERO]);
    }

    #[test]
    fn ring_visits_each_border_tile_once() {
        for radius in 1..6 {
            let offsets: Vec<_> = RingWalk::new(radius).collect();
            assert_eq!(offsets.len(), 8 * radius as usize);
            let unique: HashSet<_> = offsets.iter().copied().collect();
            assert_eq!(unique.len(), offsets.len());
            for offset in offsets {
                assert_eq!(offset.x.abs().max(offset.y.abs()), radius);
            }
        }
    }

    #[test]
    fn ring_starts_top_left_and_walks_clockwise() {
        let offsets: Vec<_> = RingWalk::new(1).collect();
        assert_eq!(
            offsets,
            vec![
                Point::new(-1, -1),
                Point::new(0, -1),
                Point::new(1, -1),
                Point::new(1, 0),
                Point::new(1, 1),
                Point::new(0, 1),
                Point::new(-1, 1),
                Point::new(-1, 0),
            ]
        );
    }
}
