//! Texture tier of the tile cache.
//!
//! A `TorusTexture` mirrors part of a [`TileCache`] window in an atlas
//! texture using its own torus mapping. Panning is tracked in pixels and
//! turned into whole-tile steps of both tiers once a full tile accumulates,
//! so only the edge that enters the window is ever re-uploaded.

use bitvec::prelude::{BitVec, Lsb0};
use model::{
    Point, Rect, TILE_BYTES, TILE_SIZE, tile_of_pixel, tile_pixel_region, tiles_of_region,
};
use thiserror::Error;
use tiles::{
    Rasterizer, TileCache, TileCacheConfig, TileCacheConfigError, TileState, TorusMapping,
};

use crate::AtlasQuad;
use crate::atlas::AtlasTexture;

/// Passes over the requested tiles per `render` call. The second pass picks up
/// tiles the maintenance thread finished while the first one was uploading.
pub const RENDER_ATTEMPTS: usize = 2;
/// Extra tiles around the viewport kept in the texture.
pub const TEXTURE_MARGIN_TILES: u32 = 10;
/// Shown in place of tiles that are not rasterized yet.
pub const DEFAULT_PLACEHOLDER_RGBA: [u8; 4] = [255, 0, 0, 255];

/// What changed in a dirty region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirtyFlag {
    /// Cached tiles are fine, only the texture copy is stale.
    OutOfDate,
    NeedsUpdate,
    NeedsRedraw,
}

impl DirtyFlag {
    fn cache_state(self) -> Option<TileState> {
        match self {
            DirtyFlag::OutOfDate => None,
            DirtyFlag::NeedsUpdate => Some(TileState::NeedsUpdate),
            DirtyFlag::NeedsRedraw => Some(TileState::NeedsRedraw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TorusTextureConfig {
    /// Texture window width in tiles.
    pub width: u32,
    /// Texture window height in tiles.
    pub height: u32,
    pub cache: TileCacheConfig,
    pub placeholder_rgba: [u8; 4],
}

impl TorusTextureConfig {
    pub fn new(width: u32, height: u32, cache: TileCacheConfig) -> Self {
        Self {
            width,
            height,
            cache,
            placeholder_rgba: DEFAULT_PLACEHOLDER_RGBA,
        }
    }

    /// Texture window covering `viewport` (document pixels) plus
    /// `TEXTURE_MARGIN_TILES`, limited to the cache window and centered with
    /// the cache on the viewport.
    pub fn covering(viewport: Rect, cache: TileCacheConfig) -> Self {
        let tiles = |extent: i32| (extent.max(0) as u32).div_ceil(TILE_SIZE) + TEXTURE_MARGIN_TILES;
        let cache = TileCacheConfig {
            center: tile_of_pixel(viewport.center()),
            ..cache
        };
        Self::new(
            tiles(viewport.width()).min(cache.width),
            tiles(viewport.height()).min(cache.height),
            cache,
        )
    }

    /// Atlas size in pixels.
    pub fn atlas_size(&self) -> (u32, u32) {
        (self.width * TILE_SIZE, self.height * TILE_SIZE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TorusTextureError {
    #[error("invalid tile cache configuration: {0}")]
    Cache(#[from] TileCacheConfigError),
    #[error("texture window must be at least 1x1 tiles")]
    EmptyWindow,
    #[error(
        "texture window {width}x{height} does not fit the {cache_width}x{cache_height} cache window"
    )]
    LargerThanCache {
        width: u32,
        height: u32,
        cache_width: u32,
        cache_height: u32,
    },
    #[error("atlas is {actual:?} px but the texture window needs {expected:?} px")]
    AtlasSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

pub struct TorusTexture<A> {
    cache: TileCache,
    mapping: TorusMapping,
    out_of_date: BitVec<usize, Lsb0>,
    shift: Point,
    atlas: A,
    placeholder: Box<[u8]>,
}

impl<A: AtlasTexture> TorusTexture<A> {
    pub fn new(config: TorusTextureConfig, atlas: A) -> Result<Self, TorusTextureError> {
        if config.width == 0 || config.height == 0 {
            return Err(TorusTextureError::EmptyWindow);
        }
        config.cache.validate()?;
        if config.width > config.cache.width || config.height > config.cache.height {
            return Err(TorusTextureError::LargerThanCache {
                width: config.width,
                height: config.height,
                cache_width: config.cache.width,
                cache_height: config.cache.height,
            });
        }
        if atlas.size() != config.atlas_size() {
            return Err(TorusTextureError::AtlasSizeMismatch {
                expected: config.atlas_size(),
                actual: atlas.size(),
            });
        }

        let cache = TileCache::new(config.cache)?;
        let mapping = TorusMapping::new(config.width, config.height);
        let placeholder = config
            .placeholder_rgba
            .iter()
            .copied()
            .cycle()
            .take(TILE_BYTES)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        log::debug!(
            "creating {}x{} tile texture over {}x{} tile cache",
            config.width,
            config.height,
            config.cache.width,
            config.cache.height
        );

        let mut texture = Self {
            cache,
            out_of_date: BitVec::repeat(true, mapping.slot_count()),
            mapping,
            shift: Point::ZERO,
            atlas,
            placeholder,
        };
        texture.reset(tile_pixel_region(config.cache.center).min());
        Ok(texture)
    }

    /// Texture window in tiles.
    pub fn region(&self) -> Rect {
        self.mapping.region()
    }

    pub fn mapping(&self) -> &TorusMapping {
        &self.mapping
    }

    /// Pixel offset panned since the last whole-tile step, each axis within
    /// `(-TILE_SIZE, TILE_SIZE)`.
    pub fn accumulated_shift(&self) -> Point {
        self.shift
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn atlas(&self) -> &A {
        &self.atlas
    }

    pub fn atlas_mut(&mut self) -> &mut A {
        &mut self.atlas
    }

    /// Whether the atlas copy of `tile` needs a reload. Tiles outside the
    /// window report `false`.
    pub fn is_out_of_date(&self, tile: Point) -> bool {
        self.mapping.contains(tile) && self.out_of_date[self.slot_of(tile)]
    }

    /// Jump to `center_pixel`, dropping everything both tiers hold.
    pub fn reset(&mut self, center_pixel: Point) {
        let center = tile_of_pixel(center_pixel);
        let half = Point::new((self.mapping.width() / 2) as i32, (self.mapping.height() / 2) as i32);
        self.mapping.reset(center - half);
        self.cache.reset(center);
        self.shift = Point::ZERO;
        self.out_of_date.fill(true);
        log::debug!("tile texture reset, region is now {}", self.region());
    }

    /// Pan by `delta` pixels.
    pub fn shift(&mut self, delta: Point) {
        let tile = i64::from(TILE_SIZE);
        let total_x = i64::from(self.shift.x) + i64::from(delta.x);
        let total_y = i64::from(self.shift.y) + i64::from(delta.y);
        // |total| < 2^32, so the whole-tile steps fit an i32.
        let steps = Point::new((total_x / tile) as i32, (total_y / tile) as i32);
        self.shift = Point::new((total_x % tile) as i32, (total_y % tile) as i32);
        if steps != Point::ZERO {
            self.advance(steps);
        }
    }

    /// Move both tiers by whole tiles, x first.
    fn advance(&mut self, steps: Point) {
        self.cache.shift(steps);

        if steps.x.unsigned_abs() >= self.mapping.width()
            || steps.y.unsigned_abs() >= self.mapping.height()
        {
            self.mapping.shift(steps);
            self.out_of_date.fill(true);
            return;
        }
        for _ in 0..steps.x.unsigned_abs() {
            self.step(Point::new(steps.x.signum(), 0));
        }
        for _ in 0..steps.y.unsigned_abs() {
            self.step(Point::new(0, steps.y.signum()));
        }
    }

    fn step(&mut self, step: Point) {
        self.mapping.shift(step);

        let region = self.mapping.region();
        let entering = if step.x > 0 {
            Rect::new(region.max_x - 1, region.min_y, region.max_x, region.max_y)
        } else if step.x < 0 {
            Rect::new(region.min_x, region.min_y, region.min_x + 1, region.max_y)
        } else if step.y > 0 {
            Rect::new(region.min_x, region.max_y - 1, region.max_x, region.max_y)
        } else {
            Rect::new(region.min_x, region.min_y, region.max_x, region.min_y + 1)
        };
        for tile in entering.points() {
            let slot = self.slot_of(tile);
            self.out_of_date.set(slot, true);
        }
    }

    /// Flag the tiles touching `region` (document pixels).
    pub fn mark_dirty(&mut self, region: Rect, flag: DirtyFlag) {
        let tiles = tiles_of_region(region);
        if let Some(state) = flag.cache_state() {
            for tile in self.cache.region().intersection(&tiles).points() {
                self.cache.mark_dirty(tile, state);
            }
        }
        for tile in self.mapping.intersect(tiles).points() {
            let slot = self.slot_of(tile);
            self.out_of_date.set(slot, true);
        }
    }

    /// Bring the atlas up to date for `region` (document pixels) and return the
    /// quads that draw it.
    ///
    /// Tiles the cache cannot deliver yet are shown as the placeholder and
    /// retried on the next call.
    pub fn render(&mut self, region: Rect, rasterizer: &mut dyn Rasterizer) -> Vec<AtlasQuad> {
        let tiles = self.mapping.intersect(tiles_of_region(region));
        if tiles.is_empty() {
            return Vec::new();
        }

        for attempt in 1..=RENDER_ATTEMPTS {
            let mut pending = 0;
            for tile in tiles.points() {
                let slot = self.slot_of(tile);
                if !self.out_of_date[slot] && !self.cache.was_changed(tile) {
                    continue;
                }
                self.cache.acknowledge_change(tile);
                if !self.reload_slot(tile, slot, rasterizer) {
                    pending += 1;
                }
            }
            if pending == 0 {
                break;
            }
            log::trace!("{pending} tiles not ready after render pass {attempt}");
        }

        self.quads(tiles, region)
    }

    /// Reload one tile from the cache. Returns `false` when the placeholder had
    /// to be uploaded instead; the tile then stays out of date.
    pub fn reload_tile(&mut self, tile: Point, rasterizer: &mut dyn Rasterizer) -> bool {
        if !self.mapping.contains(tile) {
            return false;
        }
        let slot = self.slot_of(tile);
        self.reload_slot(tile, slot, rasterizer)
    }

    fn reload_slot(&mut self, tile: Point, slot: usize, rasterizer: &mut dyn Rasterizer) -> bool {
        let physical = self.mapping.physical_of_index(slot);
        let origin = (physical.x as u32 * TILE_SIZE, physical.y as u32 * TILE_SIZE);
        match self.cache.get_tile(tile, rasterizer) {
            Some(pixels) => {
                log::trace!("uploading tile {tile} to atlas slot {physical}");
                self.atlas.upload(origin, &pixels);
                self.out_of_date.set(slot, false);
                true
            }
            None => {
                log::trace!("tile {tile} not ready, uploading placeholder");
                self.atlas.upload(origin, &self.placeholder);
                false
            }
        }
    }

    fn quads(&self, tiles: Rect, region: Rect) -> Vec<AtlasQuad> {
        let (atlas_width, atlas_height) = self.atlas.size();
        let mut quads = Vec::with_capacity(4);
        for part in self.mapping.split(tiles) {
            if part.is_empty() {
                continue;
            }
            let part_pixels = part.scale(TILE_SIZE as i32);
            let target = part_pixels.intersection(&region);
            if target.is_empty() {
                continue;
            }
            let physical = self.mapping.map(part.min());
            let atlas_min = Point::new(
                physical.x * TILE_SIZE as i32 + (target.min_x - part_pixels.min_x),
                physical.y * TILE_SIZE as i32 + (target.min_y - part_pixels.min_y),
            );
            quads.push(AtlasQuad {
                target: [
                    target.min_x as f32,
                    target.min_y as f32,
                    target.max_x as f32,
                    target.max_y as f32,
                ],
                uv: [
                    atlas_min.x as f32 / atlas_width as f32,
                    atlas_min.y as f32 / atlas_height as f32,
                    (atlas_min.x + target.width()) as f32 / atlas_width as f32,
                    (atlas_min.y + target.height()) as f32 / atlas_height as f32,
                ],
            });
        }
        quads
    }

    /// Install the cache's background rasterizer.
    pub fn set_background_rasterizer(&mut self, rasterizer: Box<dyn Rasterizer + Send>) {
        self.cache.set_background_rasterizer(rasterizer);
    }

    /// Called on the maintenance thread for every tile it finished, so the
    /// owner can schedule a redraw.
    pub fn set_content_changed_callback<F>(&self, callback: F)
    where
        F: Fn(Point) + Send + Sync + 'static,
    {
        self.cache.set_tile_changed_callback(callback);
    }

    fn slot_of(&self, tile: Point) -> usize {
        self.mapping.slot_index(self.mapping.map(tile))
    }
}

impl<A> std::fmt::Debug for TorusTexture<A> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TorusTexture")
            .field("region", &self.mapping.region())
            .field("shift", &self.shift)
            .field("out_of_date", &self.out_of_date.count_ones())
            .field("cache", &self.cache)
            .finish()
    }
}
