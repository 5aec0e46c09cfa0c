//! Window-backed presentation surface.

use std::sync::Arc;

use ash::vk;
use swapframe_render::PresentationSurface;
use winit::window::Window;

/// [`PresentationSurface`] over a winit window.
///
/// `WindowEvent::Resized` sets the resize flag; the renderer polls and clears
/// it after presenting. The winit event loop owns the thread, so this surface
/// never blocks: a minimized window defers the swapchain rebuild until the
/// runner sees a non-zero size again.
pub struct WindowSurface {
    window: Arc<Window>,
    resized: bool,
}

impl WindowSurface {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            resized: false,
        }
    }

    /// Record a resize reported by the event loop.
    pub fn mark_resized(&mut self) {
        self.resized = true;
    }

    /// Whether the window currently has no drawable area.
    pub fn is_minimized(&self) -> bool {
        let size = self.window.inner_size();
        size.width == 0 || size.height == 0
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }
}

impl PresentationSurface for WindowSurface {
    fn drawable_extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn wait_events(&mut self) -> bool {
        false
    }
}
