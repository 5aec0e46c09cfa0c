//! Viewer application: an animated clear colour.

use std::f32::consts::TAU;

use swapframe_app::{AppContext, FrameApp, FrameContext};
use tracing::info;

/// Seconds for one full trip around the colour wheel.
const CYCLE_SECONDS: f32 = 12.0;

/// Peak channel intensity, kept low so the window is easy on the eyes.
const BRIGHTNESS: f32 = 0.35;

/// Clears the swapchain to a slowly cycling colour.
///
/// Nothing is drawn on top; every visible change comes from the render pass
/// clear, so resizing or minimizing the window exercises swapchain
/// recreation on its own.
pub struct Viewer {
    elapsed: f32,
    rebuilds: u32,
}

impl FrameApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        info!(
            "Viewer ready: {}x{}, {} frames in flight",
            ctx.width(),
            ctx.height(),
            ctx.frames_in_flight()
        );
        ctx.renderer.set_clear_color(clear_color_at(0.0));
        Ok(Self {
            elapsed: 0.0,
            rebuilds: 0,
        })
    }

    fn update(&mut self, ctx: &mut AppContext, dt: f32) {
        self.elapsed = (self.elapsed + dt) % CYCLE_SECONDS;
        ctx.renderer.set_clear_color(clear_color_at(self.elapsed));
    }

    fn render(&mut self, _ctx: &AppContext, _frame: &FrameContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        self.rebuilds += 1;
        info!(
            "Swapchain generation {} at {width}x{height} (aspect {:.3})",
            ctx.renderer.generation(),
            ctx.aspect_ratio()
        );
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        info!(
            "Viewer done: {} frames, {} swapchain rebuilds",
            ctx.frame_count(),
            self.rebuilds
        );
    }
}

/// Clear colour `seconds` into the cycle: three phase-shifted sines.
fn clear_color_at(seconds: f32) -> [f32; 4] {
    let phase = seconds / CYCLE_SECONDS * TAU;
    let channel = |offset: f32| BRIGHTNESS * 0.5 * (1.0 + (phase + offset).sin());
    [
        channel(0.0),
        channel(TAU / 3.0),
        channel(2.0 * TAU / 3.0),
        1.0,
    ]
}
