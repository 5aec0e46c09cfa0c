//! `FrameApp` trait definition.

use crate::context::AppContext;
use crate::frame::FrameContext;
use winit::event::WindowEvent;

/// Trait for swapframe applications.
///
/// The framework creates the window, GPU context and renderer, acquires and
/// presents swapchain images, and recreates the swapchain when the window
/// changes. The application only records commands into the swapchain render
/// pass.
pub trait FrameApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window and renderer have been created.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before rendering, even when no swapchain image can
    /// be drawn (for example, while the window is minimized).
    ///
    /// # Arguments
    /// * `ctx` - Application context with window and renderer access
    /// * `dt` - Delta time in seconds since last frame
    fn update(&mut self, ctx: &mut AppContext, dt: f32);

    /// Record draw commands.
    ///
    /// Called with the swapchain render pass already begun on
    /// `frame.command_buffer`. The framework ends the pass, submits and
    /// presents.
    fn render(&mut self, ctx: &AppContext, frame: &FrameContext) -> anyhow::Result<()>;

    /// Handle a new swapchain generation.
    ///
    /// Called after the swapchain was recreated, with its new extent.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events.
    ///
    /// Return `true` if the event was handled and should not be processed
    /// further.
    ///
    /// Default implementation does nothing and returns `false`.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Cleanup resources before shutdown.
    ///
    /// The GPU is idle when this is called.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
