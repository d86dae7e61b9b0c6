//! Clip paths, accumulated clip chains, and the clip-stack optimizer.
//!
//! While the display list is built every node inherits the clip chain of its
//! parent; a node with its own clip path extends the chain by one entry.
//! Siblings that add no clip of their own share the very same chain, so the
//! painter can compare consecutive nodes by pointer identity and skip the
//! (expensive) save/clip/restore round trip on the surface.

use std::rc::Rc;

use crate::geometry::Rect;
use crate::surface::Canvas;
use crate::transform::Transform;
use crate::tree::NodeId;

/// Geometry of a clip path, in the owning node's local coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipShape {
    Rect(Rect),
    RoundedRect { rect: Rect, radius: f32 },
    /// Closed polygon; the last point connects back to the first.
    Polygon(Vec<(f32, f32)>),
}

impl ClipShape {
    pub fn bounds(&self) -> Rect {
        match self {
            ClipShape::Rect(rect) | ClipShape::RoundedRect { rect, .. } => *rect,
            ClipShape::Polygon(points) => Rect::from_points(points),
        }
    }

    /// A clip with no area hides everything drawn under it.
    pub fn is_empty(&self) -> bool {
        match self {
            ClipShape::Polygon(points) => points.len() < 3 || self.bounds().is_empty(),
            _ => self.bounds().is_empty(),
        }
    }
}

/// One clip path in a chain, with the world transform of the node owning it.
#[derive(Debug, Clone)]
pub struct ClipEntry {
    pub owner: NodeId,
    pub shape: Rc<ClipShape>,
    pub transform: Transform,
}

impl ClipEntry {
    fn same_as(&self, other: &ClipEntry) -> bool {
        self.owner == other.owner && Rc::ptr_eq(&self.shape, &other.shape)
    }
}

/// Non-empty, root-most-first list of clip entries.
///
/// "No clipping" is `Option::<ClipChain>::None`, never an empty chain.
#[derive(Debug, Clone)]
pub struct ClipChain(Rc<[ClipEntry]>);

impl ClipChain {
    pub fn new(entry: ClipEntry) -> Self {
        Self(Rc::from(vec![entry]))
    }

    /// The parent's chain followed by `entry`.
    pub fn extend(parent: Option<&ClipChain>, entry: ClipEntry) -> Self {
        match parent {
            Some(parent) => {
                let mut entries = Vec::with_capacity(parent.len() + 1);
                entries.extend(parent.0.iter().cloned());
                entries.push(entry);
                Self(Rc::from(entries))
            }
            None => Self::new(entry),
        }
    }

    pub fn entries(&self) -> &[ClipEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        // Never true for chains built through `new`/`extend`
        self.0.is_empty()
    }

    pub fn ptr_eq(&self, other: &ClipChain) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether some entry leaves no drawable area.
    pub fn is_all_clipped(&self) -> bool {
        self.0
            .iter()
            .any(|entry| entry.shape.is_empty() || entry.transform.is_degenerate())
    }
}

/// Whether switching from `previous` to `current` requires touching the
/// surface clip state.
pub fn chains_differ(current: Option<&ClipChain>, previous: Option<&ClipChain>) -> bool {
    match (current, previous) {
        (None, None) => false,
        (Some(current), Some(previous)) => {
            if current.ptr_eq(previous) {
                return false;
            }
            current.len() != previous.len()
                || current
                    .entries()
                    .iter()
                    .zip(previous.entries())
                    .any(|(a, b)| !a.same_as(b))
        }
        _ => true,
    }
}

/// Bring the canvas clip state from `previous` to `current`.
///
/// Restores the pre-clip baseline when a previous chain was applied, then
/// saves and applies every entry of `current` root-most first. Returns the
/// chain now in effect so the next call can compare against it.
pub fn apply_clip(
    current: Option<&ClipChain>,
    previous: Option<ClipChain>,
    canvas: &mut dyn Canvas,
) -> Option<ClipChain> {
    if !chains_differ(current, previous.as_ref()) {
        return previous;
    }

    if previous.is_some() {
        canvas.restore();
        crate::render_stats::record_clip_restored();
    }

    let chain = current?;
    canvas.save();
    for entry in chain.entries() {
        canvas.clip(&entry.shape, &entry.transform);
    }
    crate::render_stats::record_clip_applied();
    Some(chain.clone())
}

/// Clip state of one layer paint pass.
#[derive(Debug, Default)]
pub struct ClipStack {
    previous: Option<ClipChain>,
    all_clipped: bool,
}

impl ClipStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare the canvas for a node clipped by `chain`.
    ///
    /// Returns `false` when the chain leaves nothing visible; the node should
    /// then be skipped.
    pub fn apply(&mut self, chain: Option<&ClipChain>, canvas: &mut dyn Canvas) -> bool {
        if chains_differ(chain, self.previous.as_ref()) {
            self.all_clipped = chain.is_some_and(ClipChain::is_all_clipped);
            self.previous = apply_clip(chain, self.previous.take(), canvas);
        }
        !self.all_clipped
    }

    /// Restore the canvas if a chain is still applied. Call once at the end
    /// of every pass.
    pub fn release(&mut self, canvas: &mut dyn Canvas) {
        if self.previous.take().is_some() {
            canvas.restore();
            crate::render_stats::record_clip_restored();
        }
        self.all_clipped = false;
    }

    pub fn current(&self) -> Option<&ClipChain> {
        self.previous.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::recording::{RecordingSurface, SurfaceOp};
    use crate::tree::Scene;

    fn owner() -> NodeId {
        let mut scene = Scene::new();
        scene.add_group()
    }

    fn entry(owner: NodeId, rect: Rect) -> ClipEntry {
        ClipEntry {
            owner,
            shape: Rc::new(ClipShape::Rect(rect)),
            transform: Transform::IDENTITY,
        }
    }

    fn count(surface: &RecordingSurface, op: fn(&SurfaceOp) -> bool) -> usize {
        surface.ops().iter().filter(|o| op(o)).count()
    }

    #[test]
    fn test_extend_keeps_root_most_first() {
        let id = owner();
        let outer = ClipChain::new(entry(id, Rect::from_size(100.0, 100.0)));
        let inner = ClipChain::extend(Some(&outer), entry(id, Rect::from_size(10.0, 10.0)));
        assert_eq!(inner.len(), 2);
        assert_eq!(inner.entries()[0].shape.bounds().width, 100.0);
        assert_eq!(inner.entries()[1].shape.bounds().width, 10.0);
    }

    #[test]
    fn test_chains_differ_by_identity() {
        let id = owner();
        let a = ClipChain::new(entry(id, Rect::from_size(10.0, 10.0)));
        let same = a.clone();
        // Equal geometry but a different clip object
        let b = ClipChain::new(entry(id, Rect::from_size(10.0, 10.0)));
        // Different chain allocation over the same entries
        let rebuilt = ClipChain(Rc::from(a.entries().to_vec()));

        assert!(!chains_differ(Some(&a), Some(&same)));
        assert!(chains_differ(Some(&a), Some(&b)));
        assert!(!chains_differ(Some(&a), Some(&rebuilt)));
        assert!(chains_differ(Some(&a), None));
        assert!(chains_differ(None, Some(&a)));
        assert!(!chains_differ(None, None));
    }

    #[test]
    fn test_shared_chain_clips_once() {
        // A [C1], B [C1], D (no clip)
        let id = owner();
        let c1 = ClipChain::new(entry(id, Rect::from_size(50.0, 50.0)));
        let mut surface = RecordingSurface::new("test", 100, 100);
        let mut stack = ClipStack::new();

        assert!(stack.apply(Some(&c1), &mut surface));
        assert!(stack.apply(Some(&c1), &mut surface));
        assert!(stack.apply(None, &mut surface));
        stack.release(&mut surface);

        assert_eq!(count(&surface, |o| matches!(o, SurfaceOp::Save)), 1);
        assert_eq!(count(&surface, |o| matches!(o, SurfaceOp::Clip(_))), 1);
        assert_eq!(count(&surface, |o| matches!(o, SurfaceOp::Restore)), 1);
        assert!(matches!(surface.ops()[0], SurfaceOp::Save));
        assert!(matches!(surface.ops()[2], SurfaceOp::Restore));
    }

    #[test]
    fn test_switching_chains_restores_before_clipping() {
        let id = owner();
        let c1 = ClipChain::new(entry(id, Rect::from_size(50.0, 50.0)));
        let c2 = ClipChain::extend(Some(&c1), entry(id, Rect::from_size(20.0, 20.0)));
        let mut surface = RecordingSurface::new("test", 100, 100);

        let prev = apply_clip(Some(&c1), None, &mut surface);
        let prev = apply_clip(Some(&c2), prev, &mut surface);
        assert!(prev.is_some_and(|p| p.ptr_eq(&c2)));

        let kinds: Vec<&str> = surface.ops().iter().map(SurfaceOp::name).collect();
        assert_eq!(
            kinds,
            vec!["save", "clip", "restore", "save", "clip", "clip"]
        );
    }

    #[test]
    fn test_empty_clip_hides_node() {
        let id = owner();
        let empty = ClipChain::new(entry(id, Rect::new(0.0, 0.0, 0.0, 10.0)));
        let mut surface = RecordingSurface::new("test", 100, 100);
        let mut stack = ClipStack::new();

        assert!(!stack.apply(Some(&empty), &mut surface));
        assert!(stack.apply(None, &mut surface));
    }

    #[test]
    fn test_release_without_clip_is_noop() {
        let mut surface = RecordingSurface::new("test", 100, 100);
        let mut stack = ClipStack::new();
        stack.apply(None, &mut surface);
        stack.release(&mut surface);
        assert!(surface.ops().is_empty());
    }
}
