//! Node-level types shared by the scene arena and the compositor.

use bitflags::bitflags;

use crate::geometry::Rect;
use crate::surface::Canvas;
use crate::transform::Transform;
use crate::tree::NodeId;

bitflags! {
    /// Per-node state consumed by the display-list builder and the painter.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Excluded from the display list together with its subtree
        const IGNORE          = 0b0000_0001;
        /// Kept in the display list but never painted
        const INVISIBLE       = 0b0000_0010;
        /// Needs repainting
        const DIRTY           = 0b0000_0100;
        /// World transform must be recomputed from the local transform
        const TRANSFORM_DIRTY = 0b0000_1000;
        /// Progressively drawn: accumulates across frames on its own layer
        const INCREMENTAL     = 0b0001_0000;
        /// Skip painting when the bounds fall outside the viewport
        const CULL            = 0b0010_0000;
    }
}

/// Three-level ordering key.
///
/// `band` selects the backing layer; `major` and `minor` order nodes that
/// share a layer. Comparison is lexicographic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority {
    pub band: i32,
    pub major: i32,
    pub minor: i32,
}

impl Priority {
    pub const fn new(band: i32, major: i32, minor: i32) -> Self {
        Self { band, major, minor }
    }
}

/// Per-node state handed to [`Paintable::paint`].
#[derive(Clone, Copy, Debug)]
pub struct PaintContext {
    pub node: NodeId,
    /// Composed world transform of the node.
    pub transform: Transform,
    pub opacity: f32,
}

/// Something that can draw itself onto a [`Canvas`].
///
/// The compositor never inspects what a node looks like. It only decides
/// whether, in which order and onto which surface `paint` is called.
pub trait Paintable {
    /// Draw the node. Coordinates are local; `ctx.transform` maps them to
    /// surface space.
    fn paint(&self, canvas: &mut dyn Canvas, ctx: &PaintContext);

    /// Local-space bounds, used for view culling.
    fn bounds(&self) -> Option<Rect> {
        None
    }

    /// Whether the node lies entirely outside `viewport` under `transform`.
    fn is_culled(&self, transform: &Transform, viewport: &Rect) -> bool {
        match self.bounds() {
            Some(bounds) => !transform.transform_rect(&bounds).intersects(viewport),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Boxed(Rect);

    impl Paintable for Boxed {
        fn paint(&self, _canvas: &mut dyn Canvas, _ctx: &PaintContext) {}

        fn bounds(&self) -> Option<Rect> {
            Some(self.0)
        }
    }

    #[test]
    fn test_priority_is_lexicographic() {
        assert!(Priority::new(0, 5, 5) < Priority::new(1, 0, 0));
        assert!(Priority::new(1, 0, 9) < Priority::new(1, 1, 0));
        assert!(Priority::new(1, 1, 0) < Priority::new(1, 1, 1));
    }

    #[test]
    fn test_default_cull_uses_bounds() {
        let viewport = Rect::from_size(100.0, 100.0);
        let node = Boxed(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(!node.is_culled(&Transform::IDENTITY, &viewport));
        assert!(node.is_culled(&Transform::translate(200.0, 0.0), &viewport));
    }
}
