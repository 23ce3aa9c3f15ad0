//! Texture tier of the canvas: mirrors cached tiles into an atlas and emits
//! the quads that draw a region of the document.
//!
//! - `torus_texture`: `TorusTexture`, the pixel-panned second cache tier.
//! - `atlas`: the `AtlasTexture` upload seam and the in-memory `CpuAtlas`.
//! - `gpu`: `WgpuAtlas`, a wgpu texture backend (feature `atlas-gpu`).

mod atlas;
#[cfg(feature = "atlas-gpu")]
mod gpu;
mod torus_texture;

pub use atlas::{AtlasTexture, CpuAtlas};
#[cfg(feature = "atlas-gpu")]
pub use gpu::{ATLAS_FORMAT, AtlasCreateError, WgpuAtlas};
pub use torus_texture::{
    DEFAULT_PLACEHOLDER_RGBA, DirtyFlag, RENDER_ATTEMPTS, TEXTURE_MARGIN_TILES, TorusTexture,
    TorusTextureConfig, TorusTextureError,
};

/// One textured rectangle of a rendered region, laid out for a vertex buffer.
///
/// `target` is `[min_x, min_y, max_x, max_y]` in document pixels and `uv` the
/// matching normalized atlas coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AtlasQuad {
    pub target: [f32; 4],
    pub uv: [f32; 4],
}
