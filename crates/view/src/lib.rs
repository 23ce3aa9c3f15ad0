//! Viewport driver of the canvas.
//!
//! Turns pan and jump gestures of the interactive thread into texture shifts
//! and resets, forwards document edits, and renders the visible rectangle.

use model::{Point, Rect, TILE_SIZE};
use renderer::{AtlasQuad, AtlasTexture, DirtyFlag, TorusTexture};
use thiserror::Error;
use tiles::Rasterizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ViewportError {
    #[error("viewport must not be empty")]
    EmptyViewport,
    #[error("viewport coordinates overflow")]
    CoordinateOverflow,
}

/// How a pan was applied to the texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanOutcome {
    /// Tiles that stay visible were kept.
    Shifted,
    /// The move was at least a texture window wide; everything was dropped.
    Jumped,
}

#[derive(Debug)]
pub struct ViewportDriver<A> {
    texture: TorusTexture<A>,
    viewport: Rect,
}

impl<A: AtlasTexture> ViewportDriver<A> {
    /// Show `viewport` (document pixels) through `texture`, which is reset
    /// around the viewport center.
    pub fn new(viewport: Rect, mut texture: TorusTexture<A>) -> Result<Self, ViewportError> {
        if viewport.is_empty() {
            return Err(ViewportError::EmptyViewport);
        }
        texture.reset(viewport.center());
        log::debug!("viewport driver showing {viewport}");
        Ok(Self { texture, viewport })
    }

    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    pub fn texture(&self) -> &TorusTexture<A> {
        &self.texture
    }

    pub fn texture_mut(&mut self) -> &mut TorusTexture<A> {
        &mut self.texture
    }

    /// Move the viewport by `delta` pixels.
    pub fn pan_by(&mut self, delta: Point) -> Result<PanOutcome, ViewportError> {
        let next = Rect::new(
            checked_add(self.viewport.min_x, delta.x)?,
            checked_add(self.viewport.min_y, delta.y)?,
            checked_add(self.viewport.max_x, delta.x)?,
            checked_add(self.viewport.max_y, delta.y)?,
        );

        let window = self.texture.region();
        let jump_x = window.width() as i64 * TILE_SIZE as i64;
        let jump_y = window.height() as i64 * TILE_SIZE as i64;
        if (delta.x as i64).abs() >= jump_x || (delta.y as i64).abs() >= jump_y {
            log::trace!("pan by {delta} exceeds the texture window, jumping");
            self.viewport = next;
            self.texture.reset(next.center());
            return Ok(PanOutcome::Jumped);
        }

        self.viewport = next;
        self.texture.shift(delta);
        Ok(PanOutcome::Shifted)
    }

    /// Center the viewport on `center` without keeping any tiles.
    pub fn jump_to(&mut self, center: Point) -> Result<(), ViewportError> {
        let delta = Point::new(
            checked_sub(center.x, self.viewport.center().x)?,
            checked_sub(center.y, self.viewport.center().y)?,
        );
        self.viewport = Rect::new(
            checked_add(self.viewport.min_x, delta.x)?,
            checked_add(self.viewport.min_y, delta.y)?,
            checked_add(self.viewport.max_x, delta.x)?,
            checked_add(self.viewport.max_y, delta.y)?,
        );
        self.texture.reset(center);
        log::debug!("viewport jumped to {}", self.viewport);
        Ok(())
    }

    /// Forward an edit of the document covering `region` (document pixels).
    pub fn document_changed(&mut self, region: Rect, flag: DirtyFlag) {
        self.texture.mark_dirty(region, flag);
    }

    /// Quads drawing the current viewport.
    pub fn frame(&mut self, rasterizer: &mut dyn Rasterizer) -> Vec<AtlasQuad> {
        self.texture.render(self.viewport, rasterizer)
    }
}

fn checked_add(current: i32, delta: i32) -> Result<i32, ViewportError> {
    current
        .checked_add(delta)
        .ok_or(ViewportError::CoordinateOverflow)
}

fn checked_sub(current: i32, delta: i32) -> Result<i32, ViewportError> {
    current
        .checked_sub(delta)
        .ok_or(ViewportError::CoordinateOverflow)
}
