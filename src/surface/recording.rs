//! A surface that records every call instead of drawing.

use super::{Canvas, Surface, SurfaceFactory, SurfaceSize};
use crate::clip::ClipShape;
use crate::color::Color;
use crate::error::SurfaceError;
use crate::geometry::Rect;
use crate::transform::Transform;

/// One recorded surface call.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Save,
    Restore,
    Clip(ClipShape),
    ClearRect(Rect),
    FillRect { rect: Rect, color: Color },
    Clear(Option<Color>),
    Fade(f32),
    /// Composite of the surface with the given label
    DrawSurface(String),
    Resize(SurfaceSize),
}

impl SurfaceOp {
    pub fn name(&self) -> &'static str {
        match self {
            SurfaceOp::Save => "save",
            SurfaceOp::Restore => "restore",
            SurfaceOp::Clip(_) => "clip",
            SurfaceOp::ClearRect(_) => "clear_rect",
            SurfaceOp::FillRect { .. } => "fill_rect",
            SurfaceOp::Clear(_) => "clear",
            SurfaceOp::Fade(_) => "fade",
            SurfaceOp::DrawSurface(_) => "draw_surface",
            SurfaceOp::Resize(_) => "resize",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordingSurface {
    label: String,
    size: SurfaceSize,
    ops: Vec<SurfaceOp>,
}

impl RecordingSurface {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self::with_size(label, SurfaceSize::new(width, height, 1.0))
    }

    pub fn with_size(label: impl Into<String>, size: SurfaceSize) -> Self {
        Self {
            label: label.into(),
            size,
            ops: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ops(&self) -> &[SurfaceOp] {
        &self.ops
    }

    /// Drain the recorded calls.
    pub fn take_ops(&mut self) -> Vec<SurfaceOp> {
        std::mem::take(&mut self.ops)
    }

    /// Number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.ops.len()
    }

    pub fn count(&self, name: &str) -> usize {
        self.ops.iter().filter(|op| op.name() == name).count()
    }
}

impl Canvas for RecordingSurface {
    fn save(&mut self) {
        self.ops.push(SurfaceOp::Save);
    }

    fn restore(&mut self) {
        self.ops.push(SurfaceOp::Restore);
    }

    fn clip(&mut self, shape: &ClipShape, _transform: &Transform) {
        self.ops.push(SurfaceOp::Clip(shape.clone()));
    }

    fn clear_rect(&mut self, rect: Rect) {
        self.ops.push(SurfaceOp::ClearRect(rect));
    }

    fn fill_rect(&mut self, rect: Rect, _transform: &Transform, color: Color) {
        self.ops.push(SurfaceOp::FillRect { rect, color });
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.size = size;
        self.ops.push(SurfaceOp::Resize(size));
    }

    fn clear(&mut self, color: Option<Color>) {
        self.ops.push(SurfaceOp::Clear(color));
    }

    fn fade(&mut self, alpha: f32) {
        self.ops.push(SurfaceOp::Fade(alpha));
    }

    fn draw_surface(&mut self, source: &Self) {
        self.ops.push(SurfaceOp::DrawSurface(source.label.clone()));
    }
}

/// Creates [`RecordingSurface`]s labelled `surface-0`, `surface-1`, ...
#[derive(Debug, Default)]
pub struct RecordingSurfaceFactory {
    created: usize,
}

impl RecordingSurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of surfaces created so far.
    pub fn created(&self) -> usize {
        self.created
    }
}

impl SurfaceFactory for RecordingSurfaceFactory {
    type Surface = RecordingSurface;

    fn create_surface(&mut self, size: SurfaceSize) -> Result<RecordingSurface, SurfaceError> {
        if !size.is_valid() {
            return Err(SurfaceError::InvalidSize {
                width: size.width,
                height: size.height,
                pixel_ratio: size.pixel_ratio,
            });
        }
        let label = format!("surface-{}", self.created);
        self.created += 1;
        Ok(RecordingSurface::with_size(label, size))
    }
}
