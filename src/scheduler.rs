//! Time-boxed, resumable painting of stale layers.
//!
//! Layers are painted in ascending key order. Progressive layers check the
//! clock after every painted node and stop once the frame budget is spent;
//! their bookmark (`draw_index`) is the first node not painted yet, so the
//! next pass continues exactly where this one stopped. Normal layers and
//! forced full repaints always run to completion.

use std::time::Duration;

use crate::clip::ClipStack;
use crate::clock::Clock;
use crate::color::Color;
use crate::display_list::{DisplayItem, DisplayList};
use crate::geometry::Rect;
use crate::layer::LayerTable;
use crate::node::{NodeFlags, PaintContext};
use crate::render_stats;
use crate::surface::Surface;
use crate::tree::Scene;

/// Per-frame budget for progressive layers.
pub const DEFAULT_INCREMENTAL_BUDGET: Duration = Duration::from_millis(16);

/// Identifies one refresh. A deferred paint only resumes while its token is
/// still the renderer's current one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RedrawToken(u64);

impl RedrawToken {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Unfinished paint work, handed back to the host between frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Continuation {
    pub token: RedrawToken,
    pub paint_all: bool,
}

/// Inputs of one paint pass that are not owned by the scheduler.
#[derive(Clone, Copy, Debug)]
pub struct PaintOptions {
    /// Repaint every layer from its start, ignoring staleness and budgets
    pub paint_all: bool,
    /// Logical area used for view culling
    pub viewport: Rect,
    /// Clear color of the lowest layer
    pub background: Option<Color>,
}

/// Summary of one paint pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PaintReport {
    /// Every stale layer reached the end of its range
    pub finished: bool,
    pub layers_painted: usize,
    pub nodes_painted: usize,
    pub nodes_skipped: usize,
}

#[derive(Debug, Clone)]
pub struct IncrementalPaintScheduler {
    budget: Option<Duration>,
}

impl Default for IncrementalPaintScheduler {
    fn default() -> Self {
        Self::new(Some(DEFAULT_INCREMENTAL_BUDGET))
    }
}

impl IncrementalPaintScheduler {
    /// `None` disables the budget: every pass runs to completion.
    pub fn new(budget: Option<Duration>) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    pub fn set_budget(&mut self, budget: Option<Duration>) {
        self.budget = budget;
    }

    /// Paint every stale layer (every layer with `paint_all`) from its
    /// bookmark towards the end of its range.
    pub fn paint_stale_layers<S: Surface>(
        &self,
        table: &mut LayerTable<S>,
        list: &DisplayList,
        scene: &mut Scene,
        clock: &dyn Clock,
        options: PaintOptions,
    ) -> PaintReport {
        let mut report = PaintReport {
            finished: true,
            ..PaintReport::default()
        };
        let lowest = table.lowest_key();

        for layer in table.iter_mut() {
            if !options.paint_all && !layer.stale {
                continue;
            }
            let key = layer.key();
            let background = if lowest == Some(key) {
                options.background
            } else {
                None
            };

            let mut start_index = layer.start_index;
            let mut end_index = layer.end_index;
            let mut full_repaint = options.paint_all;
            if end_index > list.len() || start_index > end_index {
                log::warn!(
                    "Layer {} owns {}..{} but the display list has {} nodes, repainting it",
                    key,
                    start_index,
                    end_index,
                    list.len()
                );
                end_index = end_index.min(list.len());
                start_index = start_index.min(end_index);
                layer.start_index = start_index;
                layer.end_index = end_index;
                full_repaint = true;
            }

            report.layers_painted += 1;
            render_stats::record_layer_painted();

            if start_index == end_index {
                layer.clear(background);
                layer.draw_index = Some(end_index);
                layer.stale = false;
                layer.restart = false;
                continue;
            }

            let start = if full_repaint || layer.restart {
                start_index
            } else {
                match layer.draw_index {
                    Some(index) if (start_index..=end_index).contains(&index) => index,
                    other => {
                        log::warn!(
                            "Layer {} has resume index {:?} outside {}..{}, restarting at {}",
                            key,
                            other,
                            start_index,
                            end_index,
                            start_index
                        );
                        start_index
                    }
                }
            };

            if start == start_index {
                // Progressive layers accumulate across passes unless their
                // range moved
                let first_incremental = list.get(start).is_some_and(|item| item.incremental);
                if full_repaint || layer.restart || !first_incremental {
                    layer.clear(background);
                }
                layer.restart = false;
            }

            let budget = self
                .budget
                .filter(|_| !full_repaint && layer.is_incremental());
            let pass_start = clock.now();
            let mut clips = ClipStack::new();
            let mut index = start;

            while index < end_index {
                let Some(item) = list.get(index) else {
                    break;
                };
                if paint_node(scene, item, layer.surface_mut(), &mut clips, &options.viewport) {
                    report.nodes_painted += 1;
                    render_stats::record_node_painted();
                } else {
                    report.nodes_skipped += 1;
                    render_stats::record_node_skipped();
                }
                index += 1;

                if let Some(budget) = budget {
                    if clock.now().saturating_sub(pass_start) > budget {
                        break;
                    }
                }
            }
            clips.release(layer.surface_mut());

            layer.draw_index = Some(index);
            if index < end_index {
                log::trace!(
                    "Layer {} out of budget at {} of {}..{}",
                    key,
                    index,
                    start_index,
                    end_index
                );
                report.finished = false;
            } else {
                layer.stale = false;
            }
        }

        render_stats::end_frame(report.finished);
        report
    }
}

/// Paint one node, or advance over it when nothing of it would show.
/// Clears the node's dirty flag either way. Returns whether `paint` ran.
fn paint_node<S: Surface>(
    scene: &mut Scene,
    item: &DisplayItem,
    surface: &mut S,
    clips: &mut ClipStack,
    viewport: &Rect,
) -> bool {
    let Some(node) = scene.node_mut(item.node) else {
        return false;
    };

    let visible = !node
        .flags
        .intersects(NodeFlags::INVISIBLE | NodeFlags::IGNORE)
        && node.opacity > 0.0
        && !node.world_transform.is_degenerate();

    let painted = match node.element.as_deref() {
        Some(element) if visible => {
            let culled = node.flags.contains(NodeFlags::CULL)
                && element.is_culled(&node.world_transform, viewport);
            if culled || !clips.apply(item.clip.as_ref(), &mut *surface) {
                false
            } else {
                let ctx = PaintContext {
                    node: item.node,
                    transform: node.world_transform,
                    opacity: node.opacity,
                };
                element.paint(&mut *surface, &ctx);
                true
            }
        }
        _ => false,
    };

    node.flags.remove(NodeFlags::DIRTY);
    painted
}
