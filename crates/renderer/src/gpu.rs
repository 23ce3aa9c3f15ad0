use model::TILE_SIZE;
use thiserror::Error;

use crate::atlas::{AtlasTexture, assert_tile_upload};

pub const ATLAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AtlasCreateError {
    #[error("atlas must be at least one tile in each direction")]
    Empty,
    #[error("atlas of {width}x{height} px exceeds the device limit of {limit} px")]
    ExceedsDeviceLimit { width: u32, height: u32, limit: u32 },
}

/// Atlas backed by one `Rgba8Unorm` wgpu texture, sampled by the canvas
/// pass and written with `Queue::write_texture`.
#[derive(Debug)]
pub struct WgpuAtlas {
    queue: wgpu::Queue,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

impl WgpuAtlas {
    pub fn new(
        device: &wgpu::Device,
        queue: wgpu::Queue,
        width_tiles: u32,
        height_tiles: u32,
    ) -> Result<Self, AtlasCreateError> {
        if width_tiles == 0 || height_tiles == 0 {
            return Err(AtlasCreateError::Empty);
        }
        let limit = device.limits().max_texture_dimension_2d;
        let width = width_tiles.saturating_mul(TILE_SIZE);
        let height = height_tiles.saturating_mul(TILE_SIZE);
        if width > limit || height > limit {
            return Err(AtlasCreateError::ExceedsDeviceLimit {
                width,
                height,
                limit,
            });
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("renderer.torus_atlas"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: ATLAS_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("renderer.torus_atlas.view"),
            ..Default::default()
        });
        log::debug!("created {width}x{height} px atlas texture");

        Ok(Self {
            queue,
            texture,
            view,
            size: (width, height),
        })
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl AtlasTexture for WgpuAtlas {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn upload(&mut self, origin: (u32, u32), pixels: &[u8]) {
        assert_tile_upload(self.size, origin, pixels);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: origin.0,
                    y: origin.1,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(TILE_SIZE * 4),
                rows_per_image: Some(TILE_SIZE),
            },
            wgpu::Extent3d {
                width: TILE_SIZE,
                height: TILE_SIZE,
                depth_or_array_layers: 1,
            },
        );
    }
}
