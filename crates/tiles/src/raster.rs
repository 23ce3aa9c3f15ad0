use model::{Point, Rect, TILE_BYTES, TILE_BYTES_PER_PIXEL, TILE_SIZE};

/// Rendering fidelity requested from a rasterizer.
///
/// `Auto` lets the rasterizer pick a level from the current scale.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quality {
    #[default]
    Auto,
    Worst,
    Medium,
    Best,
}

/// Paints document content into tile canvases.
///
/// The cache only decides when `draw` runs and for which region; it never
/// looks at the pixels.
pub trait Rasterizer {
    /// Paint exactly `region` (document pixels) into `canvas`.
    fn draw(&mut self, canvas: &mut TileCanvas<'_>, region: Rect);

    /// With incremental mode on, `draw` may assume the canvas still holds the
    /// previous content of the region.
    fn set_incremental(&mut self, _incremental: bool) {}

    fn set_quality(&mut self, quality: Quality);

    fn quality(&self) -> Quality;
}

impl<R: Rasterizer + ?Sized> Rasterizer for Box<R> {
    fn draw(&mut self, canvas: &mut TileCanvas<'_>, region: Rect) {
        (**self).draw(canvas, region)
    }

    fn set_incremental(&mut self, incremental: bool) {
        (**self).set_incremental(incremental)
    }

    fn set_quality(&mut self, quality: Quality) {
        (**self).set_quality(quality)
    }

    fn quality(&self) -> Quality {
        (**self).quality()
    }
}

/// RGBA8 drawing surface backed by one tile buffer.
///
/// Coordinates are document pixels; the canvas translates them into the tile
/// and silently clips everything outside of it.
#[derive(Debug)]
pub struct TileCanvas<'a> {
    pixels: &'a mut [u8],
    region: Rect,
}

impl<'a> TileCanvas<'a> {
    pub fn new(pixels: &'a mut [u8], region: Rect) -> Self {
        assert_eq!(
            pixels.len(),
            TILE_BYTES,
            "tile canvas buffer length mismatch"
        );
        assert!(
            region.width() == TILE_SIZE as i32 && region.height() == TILE_SIZE as i32,
            "tile canvas region {region} is not one tile"
        );
        Self { pixels, region }
    }

    /// Document pixel region covered by this canvas.
    pub fn region(&self) -> Rect {
        self.region
    }

    pub fn clear(&mut self, rgba: [u8; 4]) {
        for pixel in self.pixels.chunks_exact_mut(TILE_BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&rgba);
        }
    }

    pub fn fill_rect(&mut self, rect: Rect, rgba: [u8; 4]) {
        let clipped = self.region.intersection(&rect);
        if clipped.is_empty() {
            return;
        }
        for y in clipped.min_y..clipped.max_y {
            let row_start = self.offset(Point::new(clipped.min_x, y));
            let row_end = row_start + clipped.width() as usize * TILE_BYTES_PER_PIXEL;
            for pixel in self.pixels[row_start..row_end].chunks_exact_mut(TILE_BYTES_PER_PIXEL) {
                pixel.copy_from_slice(&rgba);
            }
        }
    }

    pub fn put_pixel(&mut self, point: Point, rgba: [u8; 4]) {
        if !self.region.contains(point) {
            return;
        }
        let offset = self.offset(point);
        self.pixels[offset..offset + TILE_BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    pub fn pixel(&self, point: Point) -> Option<[u8; 4]> {
        if !self.region.contains(point) {
            return None;
        }
        let offset = self.offset(point);
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&self.pixels[offset..offset + TILE_BYTES_PER_PIXEL]);
        Some(rgba)
    }

    fn offset(&self, point: Point) -> usize {
        let local = point - self.region.min();
        (local.y as usize * TILE_SIZE as usize + local.x as usize) * TILE_BYTES_PER_PIXEL
    }
}
