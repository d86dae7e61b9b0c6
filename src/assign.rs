//! Mapping of the ordered display list onto layers.
//!
//! Consecutive nodes that resolve to the same [`LayerKey`] form one layer
//! range. The assigner creates missing layers through the surface factory,
//! records each layer's new range and decides which layers must be
//! repainted.

use std::collections::{HashMap, HashSet};

use crate::display_list::DisplayList;
use crate::error::LayerError;
use crate::layer::{LayerKey, LayerTable};
use crate::surface::{Surface, SurfaceFactory, SurfaceSize};
use crate::tree::Scene;

/// Outcome of one assignment pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Assignment {
    /// Layers that must be repainted, ascending
    pub stale: Vec<LayerKey>,
    /// Keys whose layer could not be created; their nodes are not painted
    pub missing: Vec<LayerKey>,
}

/// Assigns display-list ranges to layers, creating layers on demand.
#[derive(Debug, Default)]
pub struct LayerAssigner {
    /// Keys whose creation failed, so the error is only logged once
    rejected: HashSet<LayerKey>,
}

impl LayerAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `list` once and update `table` to match it.
    ///
    /// Dirty state is read from `scene`; nothing in the scene is modified.
    pub fn assign<F: SurfaceFactory>(
        &mut self,
        list: &DisplayList,
        scene: &Scene,
        table: &mut LayerTable<F::Surface>,
        factory: &mut F,
        size: SurfaceSize,
    ) -> Assignment {
        // Bookmarks of progressive passes cut short by the budget
        let mut unfinished = HashMap::new();
        for layer in table.iter_mut() {
            if layer.stale && !layer.restart {
                if let Some(index) = layer.draw_index.filter(|i| *i < layer.end_index) {
                    unfinished.insert(layer.key(), index);
                }
            }
            layer.used_this_refresh = false;
            layer.stale = false;
        }

        let mut missing = Vec::new();
        let mut open: Option<LayerKey> = None;
        let mut band: Option<i32> = None;
        // Set once a progressive node was seen in the current band
        let mut after_incremental = false;

        for (i, item) in list.iter().enumerate() {
            let item_band = item.priority.band;
            if band != Some(item_band) {
                band = Some(item_band);
                after_incremental = false;
            }

            let mut key = if item.incremental {
                after_incremental = true;
                LayerKey::incremental(item_band)
            } else if after_incremental {
                LayerKey::after_incremental(item_band)
            } else {
                LayerKey::base(item_band)
            };

            if let Some(prev) = open.filter(|prev| *prev != key) {
                // A layer owns one contiguous range; never reopen it
                if table.get(key).is_some_and(|layer| layer.used_this_refresh) {
                    log::warn!(
                        "Layer {} already closed this refresh, keeping node {} on layer {}",
                        key,
                        i,
                        prev
                    );
                    key = prev;
                }
            }

            if open != Some(key) {
                if let Some(prev) = open {
                    close_layer(table, prev, i);
                }
                open = Some(key);

                if self.ensure_layer(key, table, factory, size) {
                    if let Some(layer) = table.get_mut(key) {
                        layer.used_this_refresh = true;
                        if layer.start_index != i {
                            layer.stale = true;
                            layer.restart = true;
                        }
                        layer.start_index = i;
                        layer.draw_index = if key.is_incremental() {
                            let bookmark = unfinished.get(&key).copied();
                            if bookmark.is_some() {
                                layer.stale = true;
                            }
                            bookmark
                        } else {
                            Some(i)
                        };
                    }
                } else if !missing.contains(&key) {
                    missing.push(key);
                }
            }

            if scene.is_dirty(item.node) {
                if let Some(layer) = table.get_mut(key) {
                    layer.stale = true;
                    // Progressive layers resume from their first dirty node
                    if layer.is_incremental() && layer.draw_index.map_or(true, |d| d > i) {
                        layer.draw_index = Some(i);
                    }
                }
            }
        }
        if let Some(prev) = open {
            close_layer(table, prev, list.len());
        }

        let mut stale = Vec::new();
        for layer in table.iter_mut() {
            if !layer.used_this_refresh {
                if layer.start_index != layer.end_index {
                    // Held nodes last refresh but none now: clear it once
                    layer.stale = true;
                    layer.start_index = 0;
                    layer.end_index = 0;
                    layer.draw_index = Some(0);
                    layer.restart = false;
                }
            } else if layer.restart || (layer.stale && layer.draw_index.is_none()) {
                layer.stale = true;
                layer.restart = true;
                layer.draw_index = Some(layer.start_index);
            }
            if layer.stale {
                stale.push(layer.key());
            }
        }

        log::trace!(
            "Assigned {} nodes to {} layers ({} stale)",
            list.len(),
            table.len(),
            stale.len()
        );
        Assignment { stale, missing }
    }

    /// Make sure a layer exists for `key`. Returns `false` when it could not
    /// be created; the next pass tries again.
    fn ensure_layer<F: SurfaceFactory>(
        &mut self,
        key: LayerKey,
        table: &mut LayerTable<F::Surface>,
        factory: &mut F,
        size: SurfaceSize,
    ) -> bool {
        if table.contains(key) {
            return true;
        }

        let created = factory
            .create_surface(size)
            .map_err(|source| LayerError::Creation { key, source })
            .and_then(|surface| table.insert(key, surface).map(|_| ()));

        match created {
            Ok(()) => {
                self.rejected.remove(&key);
                log::info!(
                    "Created layer {} ({}x{} @ {}x)",
                    key,
                    size.width,
                    size.height,
                    size.pixel_ratio
                );
                true
            }
            Err(err) => {
                if self.rejected.insert(key) {
                    log::error!("{}", err);
                }
                false
            }
        }
    }

    /// Forget earlier creation failures, so they are reported again.
    pub fn reset_rejections(&mut self) {
        self.rejected.clear();
    }
}

/// Record the end of `key`'s range; a moved end makes the layer stale.
fn close_layer<S: Surface>(table: &mut LayerTable<S>, key: LayerKey, end: usize) {
    if let Some(layer) = table.get_mut(key) {
        if layer.end_index != end {
            layer.stale = true;
            layer.restart = true;
        }
        layer.end_index = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display_list::{build_display_list, order_display_list};
    use crate::error::SurfaceError;
    use crate::node::{NodeFlags, PaintContext, Paintable, Priority};
    use crate::surface::{Canvas, RecordingSurface, RecordingSurfaceFactory};
    use crate::tree::NodeId;

    struct Dot;

    impl Paintable for Dot {
        fn paint(&self, _canvas: &mut dyn Canvas, _ctx: &PaintContext) {}
    }

    fn size() -> SurfaceSize {
        SurfaceSize::new(100, 100, 1.0)
    }

    fn run(
        assigner: &mut LayerAssigner,
        scene: &mut Scene,
        table: &mut LayerTable<RecordingSurface>,
        factory: &mut RecordingSurfaceFactory,
    ) -> Assignment {
        let mut list = build_display_list(scene, false);
        order_display_list(&mut list);
        assigner.assign(&list, scene, table, factory, size())
    }

    fn clean(scene: &mut Scene, ids: &[NodeId]) {
        for id in ids {
            scene.node_mut(*id).unwrap().flags.remove(NodeFlags::DIRTY);
        }
    }

    #[test]
    fn test_bands_get_their_own_layers() {
        let mut scene = Scene::new();
        scene.add_root(Dot);
        scene.add_root(Dot);
        let top = scene.add_root(Dot);
        scene.set_priority(top, Priority::new(1, 0, 0));

        let mut table = LayerTable::new();
        let mut factory = RecordingSurfaceFactory::new();
        let result = run(&mut LayerAssigner::new(), &mut scene, &mut table, &mut factory);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(LayerKey::base(0)).unwrap().range(), 0..2);
        assert_eq!(table.get(LayerKey::base(1)).unwrap().range(), 2..3);
        assert_eq!(result.stale, vec![LayerKey::base(0), LayerKey::base(1)]);
    }

    #[test]
    fn test_clean_scene_marks_nothing_stale() {
        let mut scene = Scene::new();
        let ids = [scene.add_root(Dot), scene.add_root(Dot)];
        let mut assigner = LayerAssigner::new();
        let mut table = LayerTable::new();
        let mut factory = RecordingSurfaceFactory::new();

        run(&mut assigner, &mut scene, &mut table, &mut factory);
        clean(&mut scene, &ids);
        let result = run(&mut assigner, &mut scene, &mut table, &mut factory);

        assert!(result.stale.is_empty());
        assert_eq!(factory.created(), 1);
    }

    #[test]
    fn test_incremental_nodes_split_the_band() {
        let mut scene = Scene::new();
        scene.add_root(Dot);
        let progressive = scene.add_root(Dot);
        scene.set_incremental(progressive, true);
        scene.add_root(Dot);

        let mut table = LayerTable::new();
        let mut factory = RecordingSurfaceFactory::new();
        run(&mut LayerAssigner::new(), &mut scene, &mut table, &mut factory);

        let keys: Vec<LayerKey> = table.keys().collect();
        assert_eq!(
            keys,
            vec![
                LayerKey::base(0),
                LayerKey::incremental(0),
                LayerKey::after_incremental(0)
            ]
        );
        assert_eq!(table.get(LayerKey::incremental(0)).unwrap().range(), 1..2);
        assert_eq!(table.get(LayerKey::after_incremental(0)).unwrap().range(), 2..3);
    }

    #[test]
    fn test_late_progressive_node_stays_on_after_layer() {
        let mut scene = Scene::new();
        let first = scene.add_root(Dot);
        scene.set_incremental(first, true);
        scene.add_root(Dot);
        let late = scene.add_root(Dot);
        scene.set_incremental(late, true);

        let mut table = LayerTable::new();
        let mut factory = RecordingSurfaceFactory::new();
        run(&mut LayerAssigner::new(), &mut scene, &mut table, &mut factory);

        // The progressive layer is not reopened for the late node
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(LayerKey::incremental(0)).unwrap().range(), 0..1);
        assert_eq!(table.get(LayerKey::after_incremental(0)).unwrap().range(), 1..3);
    }

    #[test]
    fn test_moved_progressive_range_restarts_from_start() {
        let mut scene = Scene::new();
        let first = scene.add_root(Dot);
        let ids: Vec<NodeId> = (0..4)
            .map(|_| {
                let id = scene.add_root(Dot);
                scene.set_incremental(id, true);
                id
            })
            .collect();
        let mut assigner = LayerAssigner::new();
        let mut table = LayerTable::new();
        let mut factory = RecordingSurfaceFactory::new();

        run(&mut assigner, &mut scene, &mut table, &mut factory);
        // As left by a finished paint pass
        let layer = table.get_mut(LayerKey::incremental(0)).unwrap();
        layer.restart = false;
        layer.stale = false;
        layer.draw_index = Some(layer.end_index);
        clean(&mut scene, &ids);
        clean(&mut scene, &[first]);
        scene.remove(first);
        let result = run(&mut assigner, &mut scene, &mut table, &mut factory);

        let layer = table.get(LayerKey::incremental(0)).unwrap();
        assert!(result.stale.contains(&LayerKey::incremental(0)));
        assert_eq!(layer.range(), 0..4);
        assert_eq!(layer.draw_index(), Some(0));
        assert!(layer.restart);
    }

    #[test]
    fn test_progressive_layer_resumes_from_first_dirty_node() {
        let mut scene = Scene::new();
        let ids: Vec<NodeId> = (0..20)
            .map(|_| {
                let id = scene.add_root(Dot);
                scene.set_incremental(id, true);
                id
            })
            .collect();
        let mut assigner = LayerAssigner::new();
        let mut table = LayerTable::new();
        let mut factory = RecordingSurfaceFactory::new();

        run(&mut assigner, &mut scene, &mut table, &mut factory);
        assert_eq!(table.get(LayerKey::incremental(0)).unwrap().draw_index(), Some(0));

        clean(&mut scene, &ids);
        scene.mark_dirty(ids[7]);
        let result = run(&mut assigner, &mut scene, &mut table, &mut factory);

        let layer = table.get(LayerKey::incremental(0)).unwrap();
        assert_eq!(result.stale, vec![LayerKey::incremental(0)]);
        assert_eq!(layer.range(), 0..20);
        assert_eq!(layer.draw_index(), Some(7));
    }

    #[test]
    fn test_shrinking_range_is_stale() {
        let mut scene = Scene::new();
        let ids: Vec<NodeId> = (0..20).map(|_| scene.add_root(Dot)).collect();
        let mut assigner = LayerAssigner::new();
        let mut table = LayerTable::new();
        let mut factory = RecordingSurfaceFactory::new();

        run(&mut assigner, &mut scene, &mut table, &mut factory);
        clean(&mut scene, &ids);
        for id in &ids[15..] {
            scene.remove(*id);
        }
        let result = run(&mut assigner, &mut scene, &mut table, &mut factory);

        let layer = table.get(LayerKey::base(0)).unwrap();
        assert_eq!(result.stale, vec![LayerKey::base(0)]);
        assert_eq!(layer.range(), 0..15);
        assert_eq!(layer.draw_index(), Some(0));
    }

    #[test]
    fn test_emptied_layer_is_cleared_once_and_kept() {
        let mut scene = Scene::new();
        let base = scene.add_root(Dot);
        let top = scene.add_root(Dot);
        scene.set_priority(top, Priority::new(1, 0, 0));
        let mut assigner = LayerAssigner::new();
        let mut table = LayerTable::new();
        let mut factory = RecordingSurfaceFactory::new();

        run(&mut assigner, &mut scene, &mut table, &mut factory);
        clean(&mut scene, &[base]);
        scene.remove(top);

        let result = run(&mut assigner, &mut scene, &mut table, &mut factory);
        assert_eq!(result.stale, vec![LayerKey::base(1)]);
        assert_eq!(table.get(LayerKey::base(1)).unwrap().range(), 0..0);

        let result = run(&mut assigner, &mut scene, &mut table, &mut factory);
        assert!(result.stale.is_empty());
        assert!(table.contains(LayerKey::base(1)));
    }

    struct FailingFactory {
        attempts: usize,
    }

    impl SurfaceFactory for FailingFactory {
        type Surface = RecordingSurface;

        fn create_surface(&mut self, _size: SurfaceSize) -> Result<RecordingSurface, SurfaceError> {
            self.attempts += 1;
            Err(SurfaceError::Backend("out of memory".into()))
        }
    }

    #[test]
    fn test_creation_failure_is_retried() {
        let mut scene = Scene::new();
        scene.add_root(Dot);
        let mut assigner = LayerAssigner::new();
        let mut table = LayerTable::new();
        let mut factory = FailingFactory { attempts: 0 };

        let mut list = build_display_list(&mut scene, false);
        order_display_list(&mut list);
        let result = assigner.assign(&list, &scene, &mut table, &mut factory, size());
        assert_eq!(result.missing, vec![LayerKey::base(0)]);
        assert!(table.is_empty());

        assigner.assign(&list, &scene, &mut table, &mut factory, size());
        assert_eq!(factory.attempts, 2);
        assert!(assigner.rejected.contains(&LayerKey::base(0)));
    }
}
