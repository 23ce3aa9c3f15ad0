use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use model::{Point, Rect, TILE_BYTES, tile_of_pixel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

struct SolidRasterizer {
    rgba: [u8; 4],
    draws: Arc<AtomicUsize>,
    quality: Quality,
}

impl SolidRasterizer {
    fn new(rgba: [u8; 4]) -> Self {
        Self {
            rgba,
            draws: Arc::new(AtomicUsize::new(0)),
            quality: Quality::Auto,
        }
    }

    fn draw_count(&self) -> usize {
        self.draws.load(Ordering::SeqCst)
    }
}

impl Rasterizer for SolidRasterizer {
    fn draw(&mut self, canvas: &mut TileCanvas<'_>, region: Rect) {
        self.draws.fetch_add(1, Ordering::SeqCst);
        canvas.fill_rect(region, self.rgba);
    }

    fn set_quality(&mut self, quality: Quality) {
        self.quality = quality;
    }

    fn quality(&self) -> Quality {
        self.quality
    }
}

/// Paints only the top-left pixel of the region and records the incremental
/// mode seen by every draw.
struct CornerRasterizer {
    incremental: bool,
    seen_incremental: Vec<bool>,
}

impl CornerRasterizer {
    fn new() -> Self {
        Self {
            incremental: true,
            seen_incremental: Vec::new(),
        }
    }
}

impl Rasterizer for CornerRasterizer {
    fn draw(&mut self, canvas: &mut TileCanvas<'_>, region: Rect) {
        self.seen_incremental.push(self.incremental);
        canvas.put_pixel(region.min(), [7, 7, 7, 7]);
    }

    fn set_incremental(&mut self, incremental: bool) {
        self.incremental = incremental;
    }

    fn set_quality(&mut self, _quality: Quality) {}

    fn quality(&self) -> Quality {
        Quality::Auto
    }
}

/// Blocks every draw until the gate sender is dropped.
struct GatedRasterizer {
    gate: Receiver<()>,
    inner: SolidRasterizer,
}

impl Rasterizer for GatedRasterizer {
    fn draw(&mut self, canvas: &mut TileCanvas<'_>, region: Rect) {
        let _ = self.gate.recv();
        self.inner.draw(canvas, region);
    }

    fn set_quality(&mut self, quality: Quality) {
        self.inner.set_quality(quality);
    }

    fn quality(&self) -> Quality {
        self.inner.quality()
    }
}

/// Reports the tile of every draw, then waits for the gate like
/// `GatedRasterizer`.
struct SignallingRasterizer {
    entered: Sender<Point>,
    gate: Receiver<()>,
    inner: SolidRasterizer,
}

impl Rasterizer for SignallingRasterizer {
    fn draw(&mut self, canvas: &mut TileCanvas<'_>, region: Rect) {
        let _ = self.entered.send(tile_of_pixel(region.min()));
        let _ = self.gate.recv();
        self.inner.draw(canvas, region);
    }

    fn set_quality(&mut self, quality: Quality) {
        self.inner.set_quality(quality);
    }

    fn quality(&self) -> Quality {
        self.inner.quality()
    }
}

struct DropFlagRasterizer {
    dropped: Arc<AtomicBool>,
}

impl Rasterizer for DropFlagRasterizer {
    fn draw(&mut self, canvas: &mut TileCanvas<'_>, region: Rect) {
        canvas.fill_rect(region, [1, 1, 1, 255]);
    }

    fn set_quality(&mut self, _quality: Quality) {}

    fn quality(&self) -> Quality {
        Quality::Auto
    }
}

impl Drop for DropFlagRasterizer {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

fn cache_4x4() -> TileCache {
    let config = TileCacheConfig {
        center: Point::new(2, 2),
        ..TileCacheConfig::with_window(4, 4)
    };
    TileCache::new(config).expect("create 4x4 tile cache")
}

fn changed_tiles(cache: &TileCache) -> Receiver<Point> {
    let (sender, receiver): (Sender<Point>, Receiver<Point>) = unbounded();
    cache.set_tile_changed_callback(move |tile| {
        let _ = sender.send(tile);
    });
    receiver
}

fn wait_for_tile(receiver: &Receiver<Point>, expected: Point) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let tile = receiver
            .recv_timeout(remaining)
            .unwrap_or_else(|_| panic!("tile {expected} was never reported as changed"));
        if tile == expected {
            return;
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn new_rejects_invalid_config() {
    let error = TileCache::new(TileCacheConfig::with_window(0, 0)).expect_err("empty window");
    assert_eq!(error, TileCacheConfigError::EmptyWindow);
}

#[test]
fn reset_centers_window_and_dirties_every_slot() {
    let mut cache = cache_4x4();
    assert_eq!(cache.region(), Rect::new(0, 0, 4, 4));
    assert_eq!(cache.dirty_tile_count(), 16);
    // without a maintenance thread nothing would clean Invalid tiles
    for tile in cache.region().points() {
        assert_eq!(cache.state(tile), Some(TileState::NeedsRedraw));
    }

    cache.reset(Point::new(-10, 7));
    assert_eq!(cache.region(), Rect::new(-12, 5, -8, 9));
    assert_eq!(cache.dirty_tile_count(), 16);
}

#[test]
fn sync_refresh_then_shift_keeps_clean_tiles() {
    let mut cache = cache_4x4();
    let mut rasterizer = SolidRasterizer::new([10, 20, 30, 255]);

    cache.mark_dirty(Point::new(0, 0), TileState::NeedsRedraw);
    let pixels = cache
        .get_tile(Point::new(0, 0), &mut rasterizer)
        .expect("needs-redraw tile is painted synchronously");
    assert_eq!(pixels.len(), TILE_BYTES);
    assert_eq!(&pixels[..4], &[10, 20, 30, 255]);
    assert_eq!(cache.state(Point::new(0, 0)), Some(TileState::Clean));
    assert_eq!(rasterizer.draw_count(), 1);

    let kept = cache
        .get_tile(Point::new(1, 0), &mut rasterizer)
        .expect("tile (1, 0)");
    assert_eq!(cache.dirty_tile_count(), 14);

    cache.shift(Point::new(1, 0));
    assert_eq!(cache.region(), Rect::new(1, 0, 5, 4));
    for y in 0..4 {
        assert_eq!(cache.state(Point::new(4, y)), Some(TileState::NeedsRedraw));
    }
    assert_eq!(cache.state(Point::new(0, 0)), None);
    assert_eq!(cache.state(Point::new(1, 0)), Some(TileState::Clean));
    // (4, 0) reuses the clean slot of (0, 0) and dirties it
    assert_eq!(cache.dirty_tile_count(), 15);

    let again = cache
        .get_tile(Point::new(1, 0), &mut rasterizer)
        .expect("tile (1, 0) after shift");
    assert!(Arc::ptr_eq(&kept, &again));
    assert_eq!(rasterizer.draw_count(), 2);
}

#[test]
fn shift_beyond_window_dirties_everything() {
    let mut cache = cache_4x4();
    let mut rasterizer = SolidRasterizer::new([1, 2, 3, 4]);
    for tile in cache.region().points() {
        cache.get_tile(tile, &mut rasterizer).expect("paint tile");
    }
    assert_eq!(cache.dirty_tile_count(), 0);

    cache.shift(Point::new(-9, 5));
    assert_eq!(cache.region(), Rect::new(-9, 5, -5, 9));
    assert_eq!(cache.dirty_tile_count(), 16);
}

#[test]
fn mark_dirty_never_lowers_state() {
    let cache = cache_4x4();
    let tile = Point::new(3, 3);
    cache.mark_dirty(tile, TileState::NeedsUpdate);
    assert_eq!(cache.state(tile), Some(TileState::NeedsRedraw));

    let mut rasterizer = SolidRasterizer::new([0, 0, 0, 255]);
    cache.get_tile(tile, &mut rasterizer).expect("paint tile");
    cache.mark_dirty(tile, TileState::NeedsUpdate);
    assert_eq!(cache.state(tile), Some(TileState::NeedsUpdate));
    cache.mark_dirty(tile, TileState::NeedsRedraw);
    cache.mark_dirty(tile, TileState::NeedsUpdate);
    assert_eq!(cache.state(tile), Some(TileState::NeedsRedraw));
    cache.mark_dirty(tile, TileState::Clean);
    assert_eq!(cache.state(tile), Some(TileState::NeedsRedraw));
}

#[test]
fn tiles_outside_window_are_ignored() {
    let cache = cache_4x4();
    let mut rasterizer = SolidRasterizer::new([0, 0, 0, 255]);
    let outside = Point::new(100, -3);

    cache.mark_dirty(outside, TileState::Invalid);
    assert_eq!(cache.dirty_tile_count(), 16);
    assert_eq!(cache.state(outside), None);
    assert!(cache.get_tile(outside, &mut rasterizer).is_none());
    assert!(!cache.was_changed(outside));
    assert_eq!(rasterizer.draw_count(), 0);
}

#[test]
fn update_paints_over_previous_content_and_redraw_clears() {
    let cache = cache_4x4();
    let tile = Point::new(1, 2);

    let mut solid = SolidRasterizer::new([50, 60, 70, 255]);
    cache.get_tile(tile, &mut solid).expect("initial paint");

    let mut corner = CornerRasterizer::new();
    cache.mark_dirty(tile, TileState::NeedsUpdate);
    let updated = cache.get_tile(tile, &mut corner).expect("incremental update");
    assert_eq!(&updated[..4], &[7, 7, 7, 7]);
    assert_eq!(&updated[4..8], &[50, 60, 70, 255]);

    cache.mark_dirty(tile, TileState::NeedsRedraw);
    let redrawn = cache.get_tile(tile, &mut corner).expect("full redraw");
    assert_eq!(&redrawn[..4], &[7, 7, 7, 7]);
    assert_eq!(&redrawn[4..8], &[0, 0, 0, 0]);

    assert_eq!(corner.seen_incremental, vec![true, false]);
    assert!(corner.incremental, "incremental mode is restored after a redraw");
}

struct RemarkingRasterizer<'a> {
    cache: &'a TileCache,
    tile: Point,
}

impl Rasterizer for RemarkingRasterizer<'_> {
    fn draw(&mut self, canvas: &mut TileCanvas<'_>, region: Rect) {
        canvas.fill_rect(region, [9, 9, 9, 255]);
        self.cache.mark_dirty(self.tile, TileState::NeedsUpdate);
    }

    fn set_quality(&mut self, _quality: Quality) {}

    fn quality(&self) -> Quality {
        Quality::Auto
    }
}

#[test]
fn mark_during_paint_keeps_tile_dirty() {
    let cache = cache_4x4();
    let tile = Point::new(2, 1);
    let mut remarking = RemarkingRasterizer {
        cache: &cache,
        tile,
    };

    let pixels = cache
        .get_tile(tile, &mut remarking)
        .expect("painted buffer is still returned");
    assert_eq!(&pixels[..4], &[9, 9, 9, 255]);
    assert_eq!(cache.state(tile), Some(TileState::NeedsRedraw));

    let mut solid = SolidRasterizer::new([1, 1, 1, 255]);
    cache.get_tile(tile, &mut solid).expect("second paint");
    assert_eq!(cache.state(tile), Some(TileState::Clean));
}

#[test]
fn background_thread_cleans_tile_and_reports_change() {
    let mut cache = cache_4x4();
    let changed = changed_tiles(&cache);
    cache.mark_dirty(Point::new(2, 2), TileState::NeedsRedraw);

    cache.set_background_rasterizer(Box::new(SolidRasterizer::new([200, 100, 0, 255])));
    assert!(cache.has_background_rasterizer());
    wait_for_tile(&changed, Point::new(2, 2));

    let mut foreground = SolidRasterizer::new([0, 0, 0, 255]);
    let pixels = cache
        .get_tile(Point::new(2, 2), &mut foreground)
        .expect("clean tile");
    assert_eq!(foreground.draw_count(), 0);
    assert_eq!(&pixels[..4], &[200, 100, 0, 255]);

    assert!(cache.was_changed(Point::new(2, 2)));
    cache.acknowledge_change(Point::new(2, 2));
    assert!(!cache.was_changed(Point::new(2, 2)));

    wait_until(|| cache.dirty_tile_count() == 0);
}

#[test]
fn invalid_tiles_wait_for_background_thread() {
    let mut cache = cache_4x4();
    let changed = changed_tiles(&cache);
    let (gate_sender, gate) = unbounded::<()>();
    cache.set_background_rasterizer(Box::new(GatedRasterizer {
        gate,
        inner: SolidRasterizer::new([5, 5, 5, 255]),
    }));

    cache.mark_dirty(Point::new(0, 0), TileState::Invalid);
    assert_eq!(cache.state(Point::new(0, 0)), Some(TileState::Invalid));
    let mut foreground = SolidRasterizer::new([0, 0, 0, 255]);
    assert!(cache.get_tile(Point::new(0, 0), &mut foreground).is_none());
    assert_eq!(foreground.draw_count(), 0);

    drop(gate_sender);
    wait_for_tile(&changed, Point::new(0, 0));
    wait_until(|| cache.state(Point::new(0, 0)) == Some(TileState::Clean));
    let pixels = cache
        .get_tile(Point::new(0, 0), &mut foreground)
        .expect("cleaned by background thread");
    assert_eq!(&pixels[..4], &[5, 5, 5, 255]);
}

#[test]
fn reset_with_background_rasterizer_invalidates_every_slot() {
    let mut cache = cache_4x4();
    let (gate_sender, gate) = unbounded::<()>();
    cache.set_background_rasterizer(Box::new(GatedRasterizer {
        gate,
        inner: SolidRasterizer::new([2, 2, 2, 255]),
    }));

    cache.reset(Point::new(20, -20));
    assert_eq!(cache.region(), Rect::new(18, -22, 22, -18));
    assert_eq!(cache.dirty_tile_count(), 16);
    for tile in cache.region().points() {
        assert_eq!(cache.state(tile), Some(TileState::Invalid), "tile {tile}");
    }

    drop(gate_sender);
    wait_until(|| cache.dirty_tile_count() == 0);
}

#[test]
fn background_paint_is_dropped_when_mapping_moves() {
    let mut cache = cache_4x4();
    let mut foreground = SolidRasterizer::new([0, 0, 0, 255]);
    for tile in cache.region().points() {
        cache.get_tile(tile, &mut foreground).expect("paint tile");
    }
    let changed = changed_tiles(&cache);
    let (gate_sender, gate) = unbounded::<()>();
    let (entered_sender, entered) = unbounded();
    cache.set_background_rasterizer(Box::new(SignallingRasterizer {
        entered: entered_sender,
        gate,
        inner: SolidRasterizer::new([6, 6, 6, 255]),
    }));

    let tile = Point::new(2, 1);
    cache.mark_dirty(tile, TileState::NeedsRedraw);
    assert_eq!(entered.recv_timeout(WAIT_TIMEOUT), Ok(tile));

    // (2, 1) stays inside the window, but the paint started on the old mapping
    cache.shift(Point::new(1, 0));
    gate_sender.send(()).expect("release first paint");
    entered
        .recv_timeout(WAIT_TIMEOUT)
        .expect("worker moves on to the next dirty tile");
    assert!(changed.try_recv().is_err());
    assert_eq!(cache.state(tile), Some(TileState::NeedsRedraw));

    drop(gate_sender);
    wait_until(|| cache.dirty_tile_count() == 0);
    let mut reported = (0..5)
        .map(|_| changed.recv_timeout(WAIT_TIMEOUT).expect("tile change"))
        .collect::<Vec<_>>();
    reported.sort_by_key(|tile| (tile.x, tile.y));
    assert_eq!(
        reported,
        vec![
            Point::new(2, 1),
            Point::new(4, 0),
            Point::new(4, 1),
            Point::new(4, 2),
            Point::new(4, 3),
        ]
    );

    let pixels = cache.get_tile(tile, &mut foreground).expect("repainted tile");
    assert_eq!(&pixels[..4], &[6, 6, 6, 255]);
    assert_eq!(foreground.draw_count(), 16);
}

#[test]
fn worker_keeps_cleaning_while_foreground_paints_its_picks() {
    let config = TileCacheConfig {
        center: Point::new(2, 2),
        batch_size: 1,
        ..TileCacheConfig::with_window(4, 4)
    };
    let mut cache = TileCache::new(config).expect("create 4x4 tile cache");
    cache.set_background_rasterizer(Box::new(SolidRasterizer::new([4, 4, 4, 255])));
    wait_until(|| cache.dirty_tile_count() == 0);

    // The worker starts at the window center, where the foreground paints
    // too, so some of its picks are already clean by the time it gets there.
    let mut foreground = SolidRasterizer::new([8, 8, 8, 255]);
    let center = Rect::new(1, 1, 3, 3);
    for _ in 0..300 {
        for tile in cache.region().points() {
            cache.mark_dirty(tile, TileState::NeedsRedraw);
        }
        for tile in center.points() {
            let _ = cache.get_tile(tile, &mut foreground);
        }
        wait_until(|| cache.dirty_tile_count() == 0);
    }
}

#[test]
fn replacing_background_rasterizer_takes_effect() {
    let mut cache = cache_4x4();
    cache.set_background_rasterizer(Box::new(SolidRasterizer::new([1, 0, 0, 255])));
    wait_until(|| cache.dirty_tile_count() == 0);

    let changed = changed_tiles(&cache);
    cache.set_background_rasterizer(Box::new(SolidRasterizer::new([0, 2, 0, 255])));
    cache.mark_dirty(Point::new(1, 1), TileState::NeedsRedraw);
    wait_for_tile(&changed, Point::new(1, 1));

    let mut foreground = SolidRasterizer::new([0, 0, 0, 255]);
    let pixels = cache
        .get_tile(Point::new(1, 1), &mut foreground)
        .expect("clean tile");
    assert_eq!(&pixels[..4], &[0, 2, 0, 255]);
}

#[test]
fn drop_stops_background_thread() {
    let dropped = Arc::new(AtomicBool::new(false));
    let mut cache = cache_4x4();
    cache.set_background_rasterizer(Box::new(DropFlagRasterizer {
        dropped: dropped.clone(),
    }));
    cache.set_tile_changed_callback(|_| {});
    drop(cache);
    assert!(dropped.load(Ordering::SeqCst));
}

#[test]
fn cleared_callback_is_not_invoked() {
    let mut cache = cache_4x4();
    let changed = changed_tiles(&cache);
    cache.clear_tile_changed_callback();
    cache.set_background_rasterizer(Box::new(SolidRasterizer::new([3, 3, 3, 255])));
    wait_until(|| cache.dirty_tile_count() == 0);
    assert!(changed.try_recv().is_err());
}

fn random_point(rng: &mut StdRng, range: i32) -> Point {
    Point::new(rng.gen_range(-range..=range), rng.gen_range(-range..=range))
}

#[test]
fn shifts_compose() {
    let mut rng = StdRng::seed_from_u64(0x7015);
    for _ in 0..200 {
        let width = rng.gen_range(1..=9);
        let height = rng.gen_range(1..=9);
        let mut stepwise = TorusMapping::new(width, height);
        let start = random_point(&mut rng, 50);
        stepwise.reset(start);
        let mut combined = stepwise;

        let first = random_point(&mut rng, 20);
        let second = random_point(&mut rng, 20);
        stepwise.shift(first);
        stepwise.shift(second);
        combined.shift(first + second);

        assert_eq!(stepwise, combined);
        assert_eq!(stepwise.region(), combined.region());
    }
}

#[test]
fn window_tiles_round_trip_through_slots() {
    let mut rng = StdRng::seed_from_u64(0xfeed);
    for _ in 0..100 {
        let width = rng.gen_range(1..=8);
        let height = rng.gen_range(1..=8);
        let mut mapping = TorusMapping::new(width, height);
        mapping.reset(random_point(&mut rng, 100));
        mapping.shift(random_point(&mut rng, 30));

        let mut seen = vec![false; mapping.slot_count()];
        for tile in mapping.region().points() {
            let physical = mapping.map(tile);
            assert!(physical.x >= 0 && physical.x < width as i32);
            assert!(physical.y >= 0 && physical.y < height as i32);
            assert_eq!(mapping.unmap(physical), tile);
            let index = mapping.slot_index(physical);
            assert!(!seen[index], "two window tiles share slot {index}");
            seen[index] = true;
            assert_eq!(mapping.physical_of_index(index), physical);
        }
        assert!(seen.into_iter().all(|used| used));
    }
}

#[test]
fn split_parts_cover_rect_without_crossing_seams() {
    let mut rng = StdRng::seed_from_u64(0x5911);
    for _ in 0..200 {
        let width = rng.gen_range(1..=8);
        let height = rng.gen_range(1..=8);
        let mut mapping = TorusMapping::new(width, height);
        mapping.reset(random_point(&mut rng, 10));
        mapping.shift(random_point(&mut rng, 10));

        let min = random_point(&mut rng, 25);
        let rect = Rect::new(
            min.x,
            min.y,
            min.x + rng.gen_range(0..12),
            min.y + rng.gen_range(0..12),
        );
        let parts = mapping.split(rect);
        let clipped = mapping.intersect(rect);

        let area: i64 = parts.iter().map(Rect::area).sum();
        assert_eq!(area, clipped.area());
        for (index, part) in parts.iter().enumerate() {
            if part.is_empty() {
                continue;
            }
            assert!(clipped.contains_rect(part));
            for other in &parts[index + 1..] {
                assert!(!part.intersects(other));
            }
            let physical_min = mapping.map(part.min());
            assert!(physical_min.x + part.width() <= width as i32);
            assert!(physical_min.y + part.height() <= height as i32);
        }
    }
}
