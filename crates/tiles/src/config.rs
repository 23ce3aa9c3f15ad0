use model::Point;
use thiserror::Error;

pub const DEFAULT_CACHE_WIDTH: u32 = 64;
pub const DEFAULT_CACHE_HEIGHT: u32 = 64;
pub const DEFAULT_MAINTENANCE_BATCH: usize = 2;
/// Upper bound on slots per cache; keeps the resident pixel memory finite.
pub const MAX_CACHE_SLOTS: usize = 128 * 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCacheConfig {
    /// Window width in tiles.
    pub width: u32,
    /// Window height in tiles.
    pub height: u32,
    /// Tiles cleaned per wake-up of the maintenance thread before it checks
    /// for shutdown again.
    pub batch_size: usize,
    /// Logical tile the window is centered on at construction.
    pub center: Point,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_CACHE_WIDTH,
            height: DEFAULT_CACHE_HEIGHT,
            batch_size: DEFAULT_MAINTENANCE_BATCH,
            center: Point::ZERO,
        }
    }
}

impl TileCacheConfig {
    pub fn with_window(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), TileCacheConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(TileCacheConfigError::EmptyWindow);
        }
        let slots = (self.width as usize)
            .checked_mul(self.height as usize)
            .ok_or(TileCacheConfigError::WindowTooLarge)?;
        if slots > MAX_CACHE_SLOTS {
            return Err(TileCacheConfigError::WindowTooLarge);
        }
        if self.batch_size == 0 {
            return Err(TileCacheConfigError::ZeroBatchSize);
        }
        Ok(())
    }

    pub fn slot_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TileCacheConfigError {
    #[error("tile cache window must be at least 1x1 tiles")]
    EmptyWindow,
    #[error("tile cache window exceeds {} slots", MAX_CACHE_SLOTS)]
    WindowTooLarge,
    #[error("maintenance batch size must be at least 1")]
    ZeroBatchSize,
}
