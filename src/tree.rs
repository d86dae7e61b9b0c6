//! Arena-based scene storage.
//!
//! The [`Scene`] stores every node of the scene graph using a sparse-set
//! architecture with generational indices. Parents are plain ids, never owning
//! references, so parent lookup is O(1) and there is no ownership cycle.
//!
//! ## Key Features
//!
//! - **Generational Indices**: [`NodeId`] contains index + generation so a
//!   stale id never resolves to a node allocated later in the same slot.
//!
//! - **Dense Storage**: Nodes are stored contiguously for cache-friendly
//!   traversal while the display list is built.
//!
//! - **Swap-Remove**: O(1) removal without holes in dense storage.
//!
//! - **Dirty Tracking**: Every property setter marks the node dirty. The
//!   display-list builder pushes a container's dirty state down to its
//!   descendants.
//!
//! - **Structure Version**: Mutations that change the shape or order of the
//!   display list bump a counter, letting a deferred paint detect that its
//!   list no longer matches the scene.

use std::rc::Rc;

use crate::clip::{ClipChain, ClipShape};
use crate::node::{NodeFlags, Paintable, Priority};
use crate::transform::Transform;

/// Unique identifier for a node in the scene.
///
/// - `index`: Position in the sparse array (reusable after removal)
/// - `generation`: Version counter that increments when a slot is reused
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Combine generation (high bits) with index (low bits).
    pub fn as_u64(self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }
}

/// Entry in the sparse map, pointing to a dense array slot.
struct SparseEntry {
    dense_index: usize,
    generation: u32,
}

/// A node and its compositor metadata.
pub(crate) struct Node {
    /// `None` for pure containers (groups), which are never painted
    pub(crate) element: Option<Box<dyn Paintable>>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) flags: NodeFlags,
    pub(crate) priority: Priority,
    pub(crate) opacity: f32,
    pub(crate) local_transform: Transform,
    pub(crate) world_transform: Transform,
    /// The node's own clip path, in local coordinates
    pub(crate) clip: Option<Rc<ClipShape>>,
    /// Accumulated clip chain from the last display-list build
    pub(crate) clip_chain: Option<ClipChain>,
    /// Back-pointer to sparse array index (for swap-remove fixup)
    sparse_index: u32,
}

/// The scene graph: a forest of nodes addressed by [`NodeId`].
pub struct Scene {
    dense: Vec<Node>,
    sparse: Vec<Option<SparseEntry>>,
    free_indices: Vec<u32>,
    roots: Vec<NodeId>,
    structure_version: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            dense: Vec::new(),
            sparse: Vec::new(),
            free_indices: Vec::new(),
            roots: Vec::new(),
            structure_version: 0,
        }
    }

    fn insert(&mut self, element: Option<Box<dyn Paintable>>) -> NodeId {
        let (sparse_index, generation) = if let Some(idx) = self.free_indices.pop() {
            let old_gen = self.sparse[idx as usize]
                .as_ref()
                .map(|e| e.generation)
                .unwrap_or(0);
            (idx, old_gen.wrapping_add(1))
        } else {
            let idx = self.sparse.len() as u32;
            self.sparse.push(None);
            (idx, 0)
        };

        let dense_index = self.dense.len();
        self.dense.push(Node {
            element,
            parent: None,
            children: Vec::new(),
            flags: NodeFlags::DIRTY | NodeFlags::TRANSFORM_DIRTY,
            priority: Priority::default(),
            opacity: 1.0,
            local_transform: Transform::IDENTITY,
            world_transform: Transform::IDENTITY,
            clip: None,
            clip_chain: None,
            sparse_index,
        });
        self.sparse[sparse_index as usize] = Some(SparseEntry {
            dense_index,
            generation,
        });
        self.structure_version += 1;

        NodeId::new(sparse_index, generation)
    }

    /// Add a paintable node at the top level.
    pub fn add_root(&mut self, element: impl Paintable + 'static) -> NodeId {
        let id = self.insert(Some(Box::new(element)));
        self.roots.push(id);
        id
    }

    /// Add an empty container at the top level.
    pub fn add_group(&mut self) -> NodeId {
        let id = self.insert(None);
        self.roots.push(id);
        id
    }

    /// Add a paintable node as the last child of `parent`.
    ///
    /// Returns `None` if `parent` is stale.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        element: impl Paintable + 'static,
    ) -> Option<NodeId> {
        self.dense_index(parent)?;
        let id = self.insert(Some(Box::new(element)));
        self.attach(id, parent);
        Some(id)
    }

    /// Add an empty container as the last child of `parent`.
    pub fn add_child_group(&mut self, parent: NodeId) -> Option<NodeId> {
        self.dense_index(parent)?;
        let id = self.insert(None);
        self.attach(id, parent);
        Some(id)
    }

    fn attach(&mut self, child: NodeId, parent: NodeId) {
        if let Some(child_dense) = self.dense_index(child) {
            self.dense[child_dense].parent = Some(parent);
        }
        if let Some(parent_dense) = self.dense_index(parent) {
            self.dense[parent_dense].children.push(child);
        }
    }

    fn detach(&mut self, id: NodeId) {
        let parent = self.dense_index(id).and_then(|idx| self.dense[idx].parent);
        match parent.and_then(|p| self.dense_index(p)) {
            Some(parent_dense) => self.dense[parent_dense].children.retain(|&c| c != id),
            None => self.roots.retain(|&r| r != id),
        }
        if let Some(idx) = self.dense_index(id) {
            self.dense[idx].parent = None;
        }
    }

    /// Move a node (with its subtree) under a new parent, or to the top level
    /// when `parent` is `None`. The node is appended after existing siblings.
    ///
    /// Moving a node under its own descendant is refused.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> bool {
        if self.dense_index(child).is_none() {
            return false;
        }
        if let Some(parent) = parent {
            if self.dense_index(parent).is_none() || self.is_ancestor_or_self(child, parent) {
                log::warn!("Refusing to move {:?} under {:?}", child, parent);
                return false;
            }
        }

        self.detach(child);
        match parent {
            Some(parent) => self.attach(child, parent),
            None => self.roots.push(child),
        }
        self.update(child, |node| {
            node.flags |= NodeFlags::TRANSFORM_DIRTY;
        });
        self.structure_version += 1;
        true
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.parent(id) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    /// Remove a node and its entire subtree.
    pub fn remove(&mut self, id: NodeId) {
        if self.dense_index(id).is_none() {
            return;
        }
        self.detach(id);

        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Some(idx) = self.dense_index(current) {
                pending.extend(self.dense[idx].children.iter().copied());
            }
            self.remove_slot(current);
        }
        self.structure_version += 1;
    }

    fn remove_slot(&mut self, id: NodeId) {
        let dense_index = match self.dense_index(id) {
            Some(idx) => idx,
            None => return,
        };
        let last_dense_index = self.dense.len() - 1;
        self.dense.swap_remove(dense_index);

        // Fix up the moved node's sparse entry (if we didn't remove the last element)
        if dense_index != last_dense_index {
            let moved_sparse_idx = self.dense[dense_index].sparse_index;
            if let Some(ref mut entry) = self.sparse[moved_sparse_idx as usize] {
                entry.dense_index = dense_index;
            }
        }

        // Keep the generation around for the next allocation of this slot
        self.sparse[id.index as usize] = Some(SparseEntry {
            dense_index: usize::MAX,
            generation: id.generation,
        });
        self.free_indices.push(id.index);
    }

    fn dense_index(&self, id: NodeId) -> Option<usize> {
        self.sparse
            .get(id.index as usize)
            .and_then(|e| e.as_ref())
            .filter(|e| e.generation == id.generation && e.dense_index != usize::MAX)
            .map(|e| e.dense_index)
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.dense_index(id).map(|idx| &self.dense[idx])
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let idx = self.dense_index(id)?;
        Some(&mut self.dense[idx])
    }

    /// Apply `f` to a node and mark it dirty. Returns `false` for stale ids.
    fn update(&mut self, id: NodeId, f: impl FnOnce(&mut Node)) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                f(node);
                node.flags |= NodeFlags::DIRTY;
                true
            }
            None => false,
        }
    }

    fn set_flag(&mut self, id: NodeId, flag: NodeFlags, value: bool) -> bool {
        self.update(id, |node| node.flags.set(flag, value))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.dense_index(id).is_some()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_group(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|node| node.element.is_none())
    }

    pub fn flags(&self, id: NodeId) -> NodeFlags {
        self.node(id)
            .map(|node| node.flags)
            .unwrap_or(NodeFlags::empty())
    }

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.flags(id).contains(NodeFlags::DIRTY)
    }

    pub fn mark_dirty(&mut self, id: NodeId) {
        self.update(id, |_| {});
    }

    pub fn priority(&self, id: NodeId) -> Option<Priority> {
        self.node(id).map(|node| node.priority)
    }

    pub fn set_priority(&mut self, id: NodeId, priority: Priority) {
        if self.update(id, |node| node.priority = priority) {
            self.structure_version += 1;
        }
    }

    pub fn set_ignore(&mut self, id: NodeId, ignore: bool) {
        // The subtree missed transform updates while it was ignored
        let changed = self.update(id, |node| {
            node.flags.set(NodeFlags::IGNORE, ignore);
            node.flags |= NodeFlags::TRANSFORM_DIRTY;
        });
        if changed {
            self.structure_version += 1;
        }
    }

    pub fn set_invisible(&mut self, id: NodeId, invisible: bool) {
        self.set_flag(id, NodeFlags::INVISIBLE, invisible);
    }

    pub fn set_incremental(&mut self, id: NodeId, incremental: bool) {
        if self.set_flag(id, NodeFlags::INCREMENTAL, incremental) {
            self.structure_version += 1;
        }
    }

    pub fn set_culling(&mut self, id: NodeId, culling: bool) {
        self.set_flag(id, NodeFlags::CULL, culling);
    }

    pub fn set_opacity(&mut self, id: NodeId, opacity: f32) {
        self.update(id, |node| node.opacity = opacity.clamp(0.0, 1.0));
    }

    pub fn set_transform(&mut self, id: NodeId, transform: Transform) {
        self.update(id, |node| {
            node.local_transform = transform;
            node.flags |= NodeFlags::TRANSFORM_DIRTY;
        });
    }

    /// Set or clear the node's own clip path (local coordinates).
    pub fn set_clip(&mut self, id: NodeId, clip: Option<ClipShape>) {
        self.update(id, |node| node.clip = clip.map(Rc::new));
    }

    pub fn local_transform(&self, id: NodeId) -> Option<Transform> {
        self.node(id).map(|node| node.local_transform)
    }

    /// World transform as of the last display-list build.
    pub fn world_transform(&self, id: NodeId) -> Option<Transform> {
        self.node(id).map(|node| node.world_transform)
    }

    /// Clip chain as of the last display-list build.
    pub fn clip_chain(&self, id: NodeId) -> Option<&ClipChain> {
        self.node(id).and_then(|node| node.clip_chain.as_ref())
    }

    /// Counter bumped whenever the display list would change shape or order.
    pub fn structure_version(&self) -> u64 {
        self.structure_version
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    pub fn clear(&mut self) {
        self.dense.clear();
        self.sparse.clear();
        self.free_indices.clear();
        self.roots.clear();
        self.structure_version += 1;
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::PaintContext;
    use crate::surface::Canvas;

    struct Dot;

    impl Paintable for Dot {
        fn paint(&self, _canvas: &mut dyn Canvas, _ctx: &PaintContext) {}
    }

    #[test]
    fn test_scene_add_remove() {
        let mut scene = Scene::new();
        let id = scene.add_root(Dot);
        assert!(scene.contains(id));
        assert_eq!(scene.roots(), &[id]);

        scene.remove(id);
        assert!(!scene.contains(id));
        assert!(scene.roots().is_empty());
    }

    #[test]
    fn test_scene_generational_index() {
        let mut scene = Scene::new();
        let id1 = scene.add_root(Dot);
        scene.remove(id1);
        let id2 = scene.add_root(Dot);

        assert!(!scene.contains(id1));
        assert!(scene.contains(id2));
        assert_eq!(id1.index, id2.index);
        assert_ne!(id1.generation, id2.generation);
    }

    #[test]
    fn test_scene_remove_subtree() {
        let mut scene = Scene::new();
        let group = scene.add_group();
        let inner = scene.add_child_group(group).unwrap();
        let leaf = scene.add_child(inner, Dot).unwrap();
        let other = scene.add_root(Dot);

        scene.remove(group);
        assert!(!scene.contains(group));
        assert!(!scene.contains(inner));
        assert!(!scene.contains(leaf));
        assert!(scene.contains(other));
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn test_scene_swap_remove_fixup() {
        let mut scene = Scene::new();
        let id1 = scene.add_root(Dot);
        let id2 = scene.add_root(Dot);
        let id3 = scene.add_root(Dot);

        scene.remove(id1);
        assert!(scene.contains(id2));
        assert!(scene.contains(id3));
        scene.set_opacity(id3, 0.5);
        assert_eq!(scene.node(id3).map(|n| n.opacity), Some(0.5));
    }

    #[test]
    fn test_scene_reparent() {
        let mut scene = Scene::new();
        let a = scene.add_group();
        let b = scene.add_group();
        let leaf = scene.add_child(a, Dot).unwrap();

        assert!(scene.set_parent(leaf, Some(b)));
        assert_eq!(scene.parent(leaf), Some(b));
        assert!(scene.children(a).is_empty());
        assert_eq!(scene.children(b), &[leaf]);

        // Moving a node under its own descendant is refused
        assert!(!scene.set_parent(b, Some(leaf)));
        assert_eq!(scene.parent(b), None);
    }

    #[test]
    fn test_scene_setters_mark_dirty() {
        let mut scene = Scene::new();
        let id = scene.add_root(Dot);
        scene.node_mut(id).unwrap().flags.remove(NodeFlags::DIRTY);
        assert!(!scene.is_dirty(id));

        scene.set_priority(id, Priority::new(1, 0, 0));
        assert!(scene.is_dirty(id));
        assert_eq!(scene.priority(id), Some(Priority::new(1, 0, 0)));
    }

    #[test]
    fn test_structure_version_tracks_shape_changes() {
        let mut scene = Scene::new();
        let id = scene.add_root(Dot);
        let version = scene.structure_version();

        scene.set_opacity(id, 0.3);
        assert_eq!(scene.structure_version(), version);

        scene.set_priority(id, Priority::new(0, 1, 0));
        assert!(scene.structure_version() > version);
    }
}
