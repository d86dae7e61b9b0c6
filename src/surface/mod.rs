//! Drawing-surface abstraction.
//!
//! The compositor never rasterizes anything itself. It talks to surfaces
//! through two traits:
//!
//! - [`Canvas`]: the object-safe drawing interface nodes paint into
//!   (save/restore, clip, clear, fill).
//! - [`Surface`]: a [`Canvas`] that backs a whole layer. It can be sized,
//!   cleared, faded for motion blur, and composited onto another surface.
//!
//! Surfaces are created on demand through a [`SurfaceFactory`].
//!
//! Two implementations ship with the crate:
//!
//! - [`raster::RasterSurface`]: a software surface backed by an RGBA image.
//! - [`recording::RecordingSurface`]: records every call, for tests and
//!   debugging.

pub mod raster;
pub mod recording;

use crate::clip::ClipShape;
use crate::color::Color;
use crate::error::SurfaceError;
use crate::geometry::Rect;
use crate::transform::Transform;

pub use raster::{RasterSurface, RasterSurfaceFactory};
pub use recording::{RecordingSurface, RecordingSurfaceFactory, SurfaceOp};

/// Drawing operations available to [`Paintable`](crate::node::Paintable) nodes.
pub trait Canvas {
    /// Push the current clip state.
    fn save(&mut self);

    /// Pop back to the last saved clip state.
    fn restore(&mut self);

    /// Intersect the current clip with `shape` mapped through `transform`.
    fn clip(&mut self, shape: &ClipShape, transform: &Transform);

    /// Clear a rectangle (surface coordinates) to transparent, honoring the clip.
    fn clear_rect(&mut self, rect: Rect);

    /// Fill `rect` (local coordinates) mapped through `transform`.
    fn fill_rect(&mut self, rect: Rect, transform: &Transform, color: Color);
}

/// Logical size and pixel ratio of a surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32, pixel_ratio: f32) -> Self {
        Self {
            width,
            height,
            pixel_ratio,
        }
    }

    /// Size of the backing store in device pixels.
    pub fn physical(&self) -> (u32, u32) {
        (
            (self.width as f32 * self.pixel_ratio).round() as u32,
            (self.height as f32 * self.pixel_ratio).round() as u32,
        )
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixel_ratio.is_finite()
            && self.pixel_ratio > 0.0
    }

    /// The full surface area in logical pixels.
    pub fn viewport(&self) -> Rect {
        Rect::from_size(self.width as f32, self.height as f32)
    }
}

/// Backing store of one layer.
pub trait Surface: Canvas {
    fn size(&self) -> SurfaceSize;

    fn resize(&mut self, size: SurfaceSize);

    /// Reset the whole surface to `color`, or to transparent when `None`.
    /// Ignores the clip state.
    fn clear(&mut self, color: Option<Color>);

    /// Multiply the alpha of everything already drawn by `alpha`.
    fn fade(&mut self, alpha: f32);

    /// Composite `source` over this surface, covering the full area.
    fn draw_surface(&mut self, source: &Self)
    where
        Self: Sized;
}

/// Creates the backing surfaces for layers (and the shared host surface in
/// single-surface mode).
pub trait SurfaceFactory {
    type Surface: Surface;

    fn create_surface(&mut self, size: SurfaceSize) -> Result<Self::Surface, SurfaceError>;
}
