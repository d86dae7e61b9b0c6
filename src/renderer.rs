//! The coordinating refresh loop.
//!
//! A [`Renderer`] owns the scene, the layer table and the surface factory.
//! Every [`refresh`](Renderer::refresh) rebuilds the display list from the
//! scene, orders it, maps it onto layers and paints whatever is stale. When a
//! progressive layer runs out of frame budget the renderer asks its
//! [`TickSource`] for another frame and finishes the work in
//! [`on_tick`](Renderer::on_tick).
//!
//! ```ignore
//! let mut renderer = Renderer::new(RasterSurfaceFactory)
//!     .width(640)
//!     .height(480)
//!     .background(Color::WHITE);
//! let node = renderer.scene_mut().add_root(my_shape);
//! renderer.refresh();
//! ```

use std::time::Duration;

use crate::assign::LayerAssigner;
use crate::clock::{Clock, NoopTicker, SystemClock, TickSource};
use crate::color::Color;
use crate::display_list::{build_display_list_into, order_display_list, DisplayList};
use crate::geometry::Rect;
use crate::layer::{Layer, LayerConfig, LayerKey, LayerTable};
use crate::render_stats;
use crate::scheduler::{
    Continuation, IncrementalPaintScheduler, PaintOptions, RedrawToken,
    DEFAULT_INCREMENTAL_BUDGET,
};
use crate::surface::{Surface, SurfaceFactory, SurfaceSize};
use crate::tree::Scene;

pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    /// Clear color of the lowest layer
    pub background: Option<Color>,
    /// Paint layers off-screen and composite them onto one host surface
    pub single_surface: bool,
    /// Per-frame budget of progressive layers (`None` paints everything at once)
    pub incremental_budget: Option<Duration>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            pixel_ratio: 1.0,
            background: None,
            single_surface: false,
            incremental_budget: Some(DEFAULT_INCREMENTAL_BUDGET),
        }
    }
}

/// Result of a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Every stale layer is fully painted
    Finished,
    /// Progressive work is left; a tick has been requested
    Pending(Continuation),
}

impl FrameStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, FrameStatus::Finished)
    }
}

/// Result of resuming deferred paint work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Finished,
    Pending(Continuation),
    /// The continuation belongs to an older refresh, or the scene changed
    /// shape since; nothing was painted
    Abandoned,
    NothingPending,
}

pub struct Renderer<F: SurfaceFactory> {
    config: RendererConfig,
    factory: F,
    scene: Scene,
    list: DisplayList,
    layers: LayerTable<F::Surface>,
    assigner: LayerAssigner,
    scheduler: IncrementalPaintScheduler,
    clock: Box<dyn Clock>,
    ticker: Box<dyn TickSource>,
    token: RedrawToken,
    pending: Option<Continuation>,
    /// Scene structure version the current display list was built from
    list_version: u64,
    /// Shared output surface (single-surface mode)
    host: Option<F::Surface>,
    host_failed: bool,
    /// Some layer was painted since the last composite
    composite_pending: bool,
    /// Next refresh repaints every layer
    force_full: bool,
}

impl<F: SurfaceFactory> Renderer<F> {
    pub fn new(factory: F) -> Self {
        Self::with_config(factory, RendererConfig::default())
    }

    pub fn with_config(factory: F, config: RendererConfig) -> Self {
        let scheduler = IncrementalPaintScheduler::new(config.incremental_budget);
        Self {
            config,
            factory,
            scene: Scene::new(),
            list: DisplayList::new(),
            layers: LayerTable::new(),
            assigner: LayerAssigner::new(),
            scheduler,
            clock: Box::new(SystemClock::new()),
            ticker: Box::new(NoopTicker),
            token: RedrawToken::default(),
            pending: None,
            list_version: 0,
            host: None,
            host_failed: false,
            composite_pending: false,
            force_full: false,
        }
    }

    pub fn width(mut self, width: u32) -> Self {
        self.config.width = width;
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.config.height = height;
        self
    }

    pub fn pixel_ratio(mut self, pixel_ratio: f32) -> Self {
        self.config.pixel_ratio = pixel_ratio;
        self
    }

    pub fn background(mut self, color: Color) -> Self {
        self.config.background = Some(color);
        self
    }

    pub fn single_surface(mut self, single_surface: bool) -> Self {
        self.config.single_surface = single_surface;
        self
    }

    pub fn incremental_budget(mut self, budget: Option<Duration>) -> Self {
        self.config.incremental_budget = budget;
        self.scheduler.set_budget(budget);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn tick_source(mut self, ticker: impl TickSource + 'static) -> Self {
        self.ticker = Box::new(ticker);
        self
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// The display list of the last refresh, bottom-most node first.
    pub fn display_list(&self) -> &DisplayList {
        &self.list
    }

    /// Layers in ascending key (composite) order.
    pub fn layers(&self) -> impl Iterator<Item = &Layer<F::Surface>> {
        self.layers.iter()
    }

    pub fn layer(&self, key: LayerKey) -> Option<&Layer<F::Surface>> {
        self.layers.get(key)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn redraw_token(&self) -> RedrawToken {
        self.token
    }

    /// Deferred paint work of the current refresh, if any.
    pub fn pending(&self) -> Option<Continuation> {
        self.pending
    }

    /// The shared output surface in single-surface mode.
    pub fn host_surface(&self) -> Option<&F::Surface> {
        self.host.as_ref()
    }

    pub fn needs_manual_compositing(&self) -> bool {
        self.config.single_surface && !self.layers.is_empty()
    }

    fn surface_size(&self) -> SurfaceSize {
        SurfaceSize::new(self.config.width, self.config.height, self.config.pixel_ratio)
    }

    fn viewport(&self) -> Rect {
        Rect::from_size(self.config.width as f32, self.config.height as f32)
    }

    /// Rebuild the display list and paint every stale layer.
    pub fn refresh(&mut self) -> FrameStatus {
        let paint_all = std::mem::take(&mut self.force_full);
        self.run_refresh(paint_all)
    }

    /// Like [`refresh`](Self::refresh), but repaints every layer in full.
    pub fn refresh_all(&mut self) -> FrameStatus {
        self.force_full = false;
        self.run_refresh(true)
    }

    fn run_refresh(&mut self, paint_all: bool) -> FrameStatus {
        render_stats::record_refresh();
        self.token = self.token.next();
        if let Some(stale) = self.pending.take() {
            log::debug!(
                "Refresh {} supersedes unfinished paint of refresh {}",
                self.token.value(),
                stale.token.value()
            );
            render_stats::record_resumption_abandoned();
        }

        build_display_list_into(&mut self.scene, false, &mut self.list);
        order_display_list(&mut self.list);
        self.list_version = self.scene.structure_version();

        let size = self.surface_size();
        let assignment = self.assigner.assign(
            &self.list,
            &self.scene,
            &mut self.layers,
            &mut self.factory,
            size,
        );
        log::trace!(
            "Refresh {}: {} nodes, {} layers, {} stale, {} missing",
            self.token.value(),
            self.list.len(),
            self.layers.len(),
            assignment.stale.len(),
            assignment.missing.len()
        );

        self.paint(paint_all)
    }

    fn paint(&mut self, paint_all: bool) -> FrameStatus {
        let options = PaintOptions {
            paint_all,
            viewport: self.viewport(),
            background: self.config.background,
        };
        let report = self.scheduler.paint_stale_layers(
            &mut self.layers,
            &self.list,
            &mut self.scene,
            self.clock.as_ref(),
            options,
        );
        if report.layers_painted > 0 {
            self.composite_pending = true;
        }

        if report.finished {
            if self.config.single_surface && self.composite_pending {
                self.composite();
            }
            FrameStatus::Finished
        } else {
            let continuation = Continuation {
                token: self.token,
                paint_all,
            };
            self.pending = Some(continuation);
            self.ticker.request_tick();
            FrameStatus::Pending(continuation)
        }
    }

    /// Continue the current refresh's deferred work. Call once per host
    /// frame after a tick was requested.
    pub fn on_tick(&mut self) -> ResumeOutcome {
        match self.pending {
            Some(continuation) => self.resume(continuation),
            None => ResumeOutcome::NothingPending,
        }
    }

    /// Continue the work described by `continuation`.
    ///
    /// Work of an older refresh is never resumed: its layer ranges index a
    /// display list that no longer exists. The same holds when the scene
    /// changed shape since the refresh; call [`refresh`](Self::refresh) then.
    pub fn resume(&mut self, continuation: Continuation) -> ResumeOutcome {
        if continuation.token != self.token {
            log::debug!(
                "Abandoning resumption of refresh {} (current is {})",
                continuation.token.value(),
                self.token.value()
            );
            render_stats::record_resumption_abandoned();
            return ResumeOutcome::Abandoned;
        }
        if self.pending.take().is_none() {
            return ResumeOutcome::NothingPending;
        }
        if self.scene.structure_version() != self.list_version {
            log::debug!(
                "Scene changed since refresh {}, abandoning resumption",
                continuation.token.value()
            );
            render_stats::record_resumption_abandoned();
            return ResumeOutcome::Abandoned;
        }

        render_stats::record_resumption();
        match self.paint(continuation.paint_all) {
            FrameStatus::Finished => ResumeOutcome::Finished,
            FrameStatus::Pending(next) => ResumeOutcome::Pending(next),
        }
    }

    /// Set the presentation of every layer of `band`. Takes effect on the
    /// next refresh, which repaints everything.
    pub fn config_layer(&mut self, band: i32, config: LayerConfig) {
        self.layers.configure_band(band, config);
        self.force_full = true;
    }

    /// Drop a layer and its surface. Nodes still mapped to it get a fresh
    /// layer on the next refresh.
    pub fn remove_layer(&mut self, key: LayerKey) -> bool {
        let removed = self.layers.remove(key).is_some();
        if removed {
            log::info!("Removed layer {}", key);
            self.composite_pending = true;
        }
        removed
    }

    /// Resize every surface. The next refresh repaints everything.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.config.width && height == self.config.height {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        let size = self.surface_size();
        log::info!(
            "Resizing {} layers to {}x{} @ {}x",
            self.layers.len(),
            width,
            height,
            size.pixel_ratio
        );

        for layer in self.layers.iter_mut() {
            layer.surface_mut().resize(size);
        }
        if let Some(host) = self.host.as_mut() {
            host.resize(size);
        }
        if let Some(stale) = self.pending.take() {
            log::debug!(
                "Resize drops unfinished paint of refresh {}",
                stale.token.value()
            );
            render_stats::record_resumption_abandoned();
        }
        self.force_full = true;
    }

    /// Draw every layer onto the host surface, lowest key first.
    ///
    /// Runs automatically in single-surface mode once a refresh (or its
    /// resumption) has finished and painted something.
    pub fn composite(&mut self) {
        if !self.ensure_host() {
            return;
        }
        let Some(host) = self.host.as_mut() else {
            return;
        };

        host.clear(None);
        for layer in self.layers.iter() {
            host.draw_surface(layer.surface());
        }
        self.composite_pending = false;
        render_stats::record_composite();
        log::trace!("Composited {} layers", self.layers.len());
    }

    fn ensure_host(&mut self) -> bool {
        if self.host.is_some() {
            return true;
        }
        let size = self.surface_size();
        match self.factory.create_surface(size) {
            Ok(surface) => {
                log::info!(
                    "Created host surface {}x{} @ {}x",
                    size.width,
                    size.height,
                    size.pixel_ratio
                );
                self.host = Some(surface);
                self.host_failed = false;
                true
            }
            Err(err) => {
                if !self.host_failed {
                    log::error!("Failed to create host surface: {}", err);
                    self.host_failed = true;
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, ManualTicker};
    use crate::node::{PaintContext, Paintable, Priority};
    use crate::surface::{Canvas, RecordingSurfaceFactory, SurfaceOp};

    struct Square;

    impl Paintable for Square {
        fn paint(&self, canvas: &mut dyn Canvas, ctx: &PaintContext) {
            canvas.fill_rect(Rect::from_size(10.0, 10.0), &ctx.transform, Color::BLACK);
        }
    }

    /// Costs one millisecond of clock time per paint.
    struct Slow(ManualClock);

    impl Paintable for Slow {
        fn paint(&self, _canvas: &mut dyn Canvas, _ctx: &PaintContext) {
            self.0.advance(Duration::from_millis(1));
        }
    }

    fn renderer() -> Renderer<RecordingSurfaceFactory> {
        Renderer::new(RecordingSurfaceFactory::new())
            .width(100)
            .height(100)
            .clock(ManualClock::new())
    }

    fn slow_renderer(nodes: usize) -> (Renderer<RecordingSurfaceFactory>, ManualTicker) {
        let clock = ManualClock::new();
        let ticker = ManualTicker::new();
        let mut renderer = Renderer::new(RecordingSurfaceFactory::new())
            .clock(clock.clone())
            .tick_source(ticker.clone())
            .incremental_budget(Some(Duration::from_micros(1500)));
        for _ in 0..nodes {
            let id = renderer.scene_mut().add_root(Slow(clock.clone()));
            renderer.scene_mut().set_incremental(id, true);
        }
        (renderer, ticker)
    }

    #[test]
    fn test_refresh_creates_layers_and_paints() {
        let mut r = renderer();
        r.scene_mut().add_root(Square);
        let top = r.scene_mut().add_root(Square);
        r.scene_mut().set_priority(top, Priority::new(3, 0, 0));

        assert!(r.refresh().is_finished());
        let keys: Vec<LayerKey> = r.layers().map(|l| l.key()).collect();
        assert_eq!(keys, vec![LayerKey::base(0), LayerKey::base(3)]);
        assert_eq!(r.layer(LayerKey::base(3)).unwrap().surface().count("fill_rect"), 1);
        assert_eq!(r.display_list().len(), 2);
        assert_eq!(r.redraw_token().value(), 1);
    }

    #[test]
    fn test_budget_exhaustion_requests_tick() {
        let (mut r, ticker) = slow_renderer(4);

        let status = r.refresh();
        assert!(!status.is_finished());
        assert_eq!(ticker.requested(), 1);
        assert!(r.pending().is_some());

        assert_eq!(r.on_tick(), ResumeOutcome::Finished);
        assert!(r.pending().is_none());
        assert_eq!(r.on_tick(), ResumeOutcome::NothingPending);
    }

    #[test]
    fn test_old_continuation_is_abandoned() {
        let (mut r, _ticker) = slow_renderer(8);
        let FrameStatus::Pending(old) = r.refresh() else {
            panic!("expected pending work");
        };
        r.refresh();

        assert_eq!(r.resume(old), ResumeOutcome::Abandoned);
        assert!(r.pending().is_some());
    }

    #[test]
    fn test_structural_change_abandons_resumption() {
        let (mut r, _ticker) = slow_renderer(8);
        assert!(!r.refresh().is_finished());
        r.scene_mut().add_root(Square);

        assert_eq!(r.on_tick(), ResumeOutcome::Abandoned);
        assert!(r.pending().is_none());
    }

    #[test]
    fn test_config_layer_forces_full_repaint() {
        let mut r = renderer();
        r.scene_mut().add_root(Square);
        r.refresh();
        r.config_layer(
            0,
            LayerConfig {
                clear_color: Some(Color::WHITE),
                ..LayerConfig::default()
            },
        );
        r.refresh();

        let ops = r.layer(LayerKey::base(0)).unwrap().surface().ops();
        assert!(ops.contains(&SurfaceOp::Clear(Some(Color::WHITE))));
        assert_eq!(r.layer(LayerKey::base(0)).unwrap().surface().count("fill_rect"), 2);
    }

    #[test]
    fn test_resize_updates_surfaces() {
        let mut r = renderer();
        r.scene_mut().add_root(Square);
        r.refresh();
        r.resize(50, 40);

        let layer = r.layer(LayerKey::base(0)).unwrap();
        assert_eq!(layer.surface().size(), SurfaceSize::new(50, 40, 1.0));
        r.refresh();
        assert_eq!(r.layer(LayerKey::base(0)).unwrap().surface().count("fill_rect"), 2);
    }

    #[test]
    fn test_remove_layer() {
        let mut r = renderer();
        r.scene_mut().add_root(Square);
        r.refresh();
        assert!(r.remove_layer(LayerKey::base(0)));
        assert!(!r.remove_layer(LayerKey::base(0)));
        assert_eq!(r.layer_count(), 0);
    }
}
