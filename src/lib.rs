//! Strata: a retained-mode 2D scene compositor.
//!
//! Application code builds a [`Scene`](tree::Scene) of paintable nodes. Every
//! refresh the [`Renderer`](renderer::Renderer) flattens the scene into a
//! priority-ordered display list, splits that list across a small set of
//! layer surfaces keyed by priority band, and repaints only the layers that
//! went stale. Progressive nodes are painted under a per-frame time budget
//! and resumed on the next frame.
//!
//! The crate never rasterizes shapes itself: nodes draw through the
//! [`Canvas`](surface::Canvas) trait, and surfaces come from a
//! [`SurfaceFactory`](surface::SurfaceFactory).

pub mod assign;
pub mod clip;
pub mod clock;
pub mod color;
pub mod display_list;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod node;
pub mod render_stats;
pub mod renderer;
pub mod scheduler;
pub mod surface;
pub mod transform;
pub mod tree;

pub mod prelude {
    pub use crate::clip::ClipShape;
    pub use crate::clock::{Clock, ManualClock, ManualTicker, SystemClock, TickSource};
    pub use crate::color::Color;
    pub use crate::display_list::{DisplayItem, DisplayList};
    pub use crate::error::{LayerError, SurfaceError};
    pub use crate::geometry::Rect;
    pub use crate::layer::{Layer, LayerConfig, LayerKey};
    pub use crate::node::{NodeFlags, PaintContext, Paintable, Priority};
    pub use crate::renderer::{FrameStatus, Renderer, RendererConfig, ResumeOutcome};
    pub use crate::scheduler::{Continuation, RedrawToken};
    pub use crate::surface::{
        Canvas, RasterSurface, RasterSurfaceFactory, RecordingSurface, RecordingSurfaceFactory,
        Surface, SurfaceFactory, SurfaceOp, SurfaceSize,
    };
    pub use crate::transform::Transform;
    pub use crate::tree::{NodeId, Scene};
}
