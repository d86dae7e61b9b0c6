//! Scene flattening into an ordered display list.
//!
//! The builder walks the scene depth-first (parents before children, siblings
//! in child order), composing world transforms and clip chains as it goes,
//! and emits one [`DisplayItem`] per paintable node. The orderer then
//! stable-sorts the list by priority, so nodes sharing a full priority keep
//! their traversal order.

use crate::clip::{ClipChain, ClipEntry};
use crate::node::{NodeFlags, Priority};
use crate::transform::Transform;
use crate::tree::{NodeId, Scene};

/// A paintable node as seen by the compositor for one refresh.
#[derive(Debug, Clone)]
pub struct DisplayItem {
    pub node: NodeId,
    pub priority: Priority,
    pub incremental: bool,
    pub clip: Option<ClipChain>,
}

/// Flat list of paintable nodes, rebuilt from scratch every refresh.
#[derive(Debug, Default)]
pub struct DisplayList {
    items: Vec<DisplayItem>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[DisplayItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&DisplayItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DisplayItem> {
        self.items.iter()
    }

    /// Topmost first, the order hit testing wants.
    pub fn iter_back_to_front(&self) -> impl Iterator<Item = &DisplayItem> {
        self.items.iter().rev()
    }

    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.items.iter().position(|item| item.node == node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.items.iter().map(|item| item.node)
    }
}

/// Flatten the scene into a new list in traversal order (not yet ordered).
pub fn build_display_list(scene: &mut Scene, include_ignored: bool) -> DisplayList {
    let mut list = DisplayList::new();
    build_display_list_into(scene, include_ignored, &mut list);
    list
}

/// Flatten the scene into an existing list (clears and reuses capacity).
///
/// Ignored nodes are skipped together with their subtree unless
/// `include_ignored` is set.
pub fn build_display_list_into(scene: &mut Scene, include_ignored: bool, list: &mut DisplayList) {
    list.items.clear();

    let mut walk = Walk {
        scene,
        include_ignored,
        out: &mut list.items,
    };
    for i in 0..walk.scene.roots().len() {
        let root = walk.scene.roots()[i];
        walk.visit(root, Inherited::ROOT);
    }
}

/// Stable sort by priority; ties keep their traversal order.
pub fn order_display_list(list: &mut DisplayList) {
    // `sort_by` is a stable, adaptive merge sort: close to linear on the
    // nearly-sorted lists consecutive refreshes produce.
    list.items.sort_by(|a, b| a.priority.cmp(&b.priority));
}

/// State pushed from a node to its children.
#[derive(Clone, Copy)]
struct Inherited<'a> {
    world: Transform,
    transform_changed: bool,
    dirty: bool,
    clip: Option<&'a ClipChain>,
}

impl Inherited<'static> {
    const ROOT: Self = Inherited {
        world: Transform::IDENTITY,
        transform_changed: false,
        dirty: false,
        clip: None,
    };
}

struct Walk<'s> {
    scene: &'s mut Scene,
    include_ignored: bool,
    out: &'s mut Vec<DisplayItem>,
}

impl Walk<'_> {
    fn visit(&mut self, id: NodeId, parent: Inherited<'_>) {
        let Some(node) = self.scene.node_mut(id) else {
            return;
        };

        if node.flags.contains(NodeFlags::IGNORE) && !self.include_ignored {
            return;
        }

        if parent.dirty {
            node.flags |= NodeFlags::DIRTY;
        }
        let transform_changed =
            parent.transform_changed || node.flags.contains(NodeFlags::TRANSFORM_DIRTY);
        if transform_changed {
            node.world_transform = parent.world.then(&node.local_transform);
            node.flags.remove(NodeFlags::TRANSFORM_DIRTY);
        }

        node.clip_chain = match node.clip.as_ref() {
            Some(shape) => Some(ClipChain::extend(
                parent.clip,
                ClipEntry {
                    owner: id,
                    shape: shape.clone(),
                    transform: node.world_transform,
                },
            )),
            None => parent.clip.cloned(),
        };

        if node.element.is_some() {
            self.out.push(DisplayItem {
                node: id,
                priority: node.priority,
                incremental: node.flags.contains(NodeFlags::INCREMENTAL),
                clip: node.clip_chain.clone(),
            });
        }

        let dirty = node.flags.contains(NodeFlags::DIRTY);
        if node.element.is_none() {
            // Containers are never painted; their dirtiness lives on in the children
            node.flags.remove(NodeFlags::DIRTY);
        }
        if node.children.is_empty() {
            return;
        }

        let world = node.world_transform;
        let clip = node.clip_chain.clone();
        let child_count = node.children.len();
        let inherited = Inherited {
            world,
            transform_changed,
            dirty,
            clip: clip.as_ref(),
        };
        for i in 0..child_count {
            let child = match self.scene.node(id) {
                Some(node) => node.children[i],
                None => return,
            };
            self.visit(child, inherited);
        }
    }
}
