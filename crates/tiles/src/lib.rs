//! Tile cache over an unbounded document plane.
//!
//! A [`TileCache`] keeps a `W x H` window of rasterized 128 px tiles addressed
//! through a [`TorusMapping`], so moving the window only refills the tiles that
//! enter it. Dirty tiles are repainted either synchronously by
//! [`TileCache::get_tile`] or by an optional maintenance thread that works
//! outward from the window center.

mod cache;
mod config;
mod maintenance;
mod raster;
mod torus;
mod version;

pub use cache::{TileCache, TileChangedCallback, TilePixels, TileState};
pub use config::{
    DEFAULT_CACHE_HEIGHT, DEFAULT_CACHE_WIDTH, DEFAULT_MAINTENANCE_BATCH, MAX_CACHE_SLOTS,
    TileCacheConfig, TileCacheConfigError,
};
pub use raster::{Quality, Rasterizer, TileCanvas};
pub use torus::TorusMapping;
pub use version::{Version, VersionTag, VersionWriteGuard};

#[cfg(test)]
mod tests;
