use std::time::Duration;

use strata::prelude::*;

/// A filled axis-aligned rectangle.
struct Block {
    rect: Rect,
    color: Color,
}

impl Paintable for Block {
    fn paint(&self, canvas: &mut dyn Canvas, ctx: &PaintContext) {
        let color = self.color.with_alpha_scaled(ctx.opacity);
        canvas.fill_rect(self.rect, &ctx.transform, color);
    }

    fn bounds(&self) -> Option<Rect> {
        Some(self.rect)
    }
}

fn main() {
    let _ = env_logger::try_init();

    let ticker = ManualTicker::new();
    let mut renderer = Renderer::new(RasterSurfaceFactory)
        .width(320)
        .height(240)
        .background(Color::rgb(0.1, 0.1, 0.15))
        .single_surface(true)
        .incremental_budget(Some(Duration::from_millis(4)))
        .tick_source(ticker.clone());

    let scene = renderer.scene_mut();

    // Backdrop panel, clipped to a window
    let panel = scene.add_group();
    scene.set_clip(panel, Some(ClipShape::Rect(Rect::new(20.0, 20.0, 280.0, 200.0))));
    scene.add_child(
        panel,
        Block {
            rect: Rect::new(0.0, 0.0, 320.0, 240.0),
            color: Color::rgb(0.18, 0.18, 0.22),
        },
    );

    // Thousands of progressive dots on their own band
    for i in 0..4000u32 {
        let x = (i * 37 % 280) as f32 + 20.0;
        let y = (i * 91 % 200) as f32 + 20.0;
        let id = scene.add_root(Block {
            rect: Rect::new(x, y, 2.0, 2.0),
            color: Color::rgba(0.3, 0.6, 1.0, 0.8),
        });
        scene.set_priority(id, Priority::new(1, 0, 0));
        scene.set_incremental(id, true);
        scene.set_culling(id, true);
    }

    // Overlay drawn above everything
    let label = scene.add_root(Block {
        rect: Rect::new(10.0, 10.0, 100.0, 16.0),
        color: Color::WHITE,
    });
    scene.set_priority(label, Priority::new(2, 0, 0));

    let mut frames = 1;
    if let FrameStatus::Pending(_) = renderer.refresh() {
        while ticker.take() {
            frames += 1;
            if let ResumeOutcome::Abandoned = renderer.on_tick() {
                break;
            }
        }
    }
    log::info!(
        "Painted {} nodes on {} layers in {} frames",
        renderer.display_list().len(),
        renderer.layer_count(),
        frames
    );

    let path = std::env::temp_dir().join("strata-progressive.png");
    match renderer.host_surface().map(|host| host.save_png(&path)) {
        Some(Ok(())) => log::info!("Wrote {}", path.display()),
        Some(Err(err)) => log::error!("Failed to write {}: {}", path.display(), err),
        None => log::error!("No host surface to save"),
    }
}
