use model::{TILE_BYTES, TILE_BYTES_PER_PIXEL, TILE_SIZE};

/// Texture that holds the texture tier's tiles, one `TILE_SIZE` square per
/// physical slot.
pub trait AtlasTexture {
    /// Size in pixels.
    fn size(&self) -> (u32, u32);

    /// Replace one tile. `origin` is the pixel position of the slot and
    /// `pixels` a full RGBA8 tile.
    fn upload(&mut self, origin: (u32, u32), pixels: &[u8]);
}

impl<T: AtlasTexture + ?Sized> AtlasTexture for Box<T> {
    fn size(&self) -> (u32, u32) {
        (**self).size()
    }

    fn upload(&mut self, origin: (u32, u32), pixels: &[u8]) {
        (**self).upload(origin, pixels)
    }
}

pub(crate) fn assert_tile_upload(size: (u32, u32), origin: (u32, u32), pixels: &[u8]) {
    assert_eq!(pixels.len(), TILE_BYTES, "atlas upload length mismatch");
    assert!(
        origin.0 % TILE_SIZE == 0 && origin.1 % TILE_SIZE == 0,
        "atlas upload origin {origin:?} is not tile aligned"
    );
    assert!(
        origin.0 + TILE_SIZE <= size.0 && origin.1 + TILE_SIZE <= size.1,
        "atlas upload at {origin:?} exceeds {size:?} atlas"
    );
}

/// Atlas kept in main memory. Used headless and to inspect uploads.
#[derive(Debug, Clone)]
pub struct CpuAtlas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    uploads: usize,
}

impl CpuAtlas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * TILE_BYTES_PER_PIXEL],
            uploads: 0,
        }
    }

    /// Sized for a texture window of `width x height` tiles.
    pub fn for_tiles(width: u32, height: u32) -> Self {
        Self::new(width * TILE_SIZE, height * TILE_SIZE)
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) outside atlas");
        let offset = (y as usize * self.width as usize + x as usize) * TILE_BYTES_PER_PIXEL;
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&self.pixels[offset..offset + TILE_BYTES_PER_PIXEL]);
        rgba
    }

    pub fn upload_count(&self) -> usize {
        self.uploads
    }

    pub fn bytes(&self) -> &[u8] {
        &self.pixels
    }
}

impl AtlasTexture for CpuAtlas {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn upload(&mut self, origin: (u32, u32), pixels: &[u8]) {
        assert_tile_upload(self.size(), origin, pixels);
        let row_bytes = TILE_SIZE as usize * TILE_BYTES_PER_PIXEL;
        let atlas_row_bytes = self.width as usize * TILE_BYTES_PER_PIXEL;
        for (row, source) in pixels.chunks_exact(row_bytes).enumerate() {
            let start = (origin.1 as usize + row) * atlas_row_bytes
                + origin.0 as usize * TILE_BYTES_PER_PIXEL;
            self.pixels[start..start + row_bytes].copy_from_slice(source);
        }
        self.uploads += 1;
    }
}
