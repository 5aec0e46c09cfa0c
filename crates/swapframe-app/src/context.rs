//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use swapframe_gpu::{GpuContext, GpuContextBuilder, VulkanBackend};
use swapframe_render::{Renderer, RendererConfig};
use winit::window::Window;

use crate::surface::WindowSurface;

/// Application context shared across all app methods.
///
/// Owns the window surface and the renderer, which in turn owns the GPU
/// context, swapchain and frame slots.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// Presentation surface polled by the renderer.
    pub surface: WindowSurface,
    /// Frame orchestrator.
    pub renderer: Renderer<VulkanBackend>,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    /// Create the surface, backend and renderer for a window.
    pub(crate) fn new(
        window: Arc<Window>,
        gpu: GpuContextBuilder,
        config: RendererConfig,
    ) -> anyhow::Result<Self> {
        // SAFETY: the context holds the window until after the surface is destroyed
        let (gpu, surface_context) = unsafe { gpu.build_for_window(window.as_ref())? };
        let backend = VulkanBackend::new(gpu, surface_context)?;

        let mut surface = WindowSurface::new(window.clone());
        let renderer = Renderer::new(backend, &mut surface, config)?;

        Ok(Self {
            window,
            surface,
            renderer,
            last_frame_time: Instant::now(),
        })
    }

    /// Get the GPU context.
    pub fn gpu(&self) -> &GpuContext {
        self.renderer.backend().gpu()
    }

    /// Get the current swapchain extent, or zero while no swapchain exists.
    pub fn extent(&self) -> vk::Extent2D {
        self.renderer.extent().unwrap_or_default()
    }

    /// Get the swapchain width.
    pub fn width(&self) -> u32 {
        self.extent().width
    }

    /// Get the swapchain height.
    pub fn height(&self) -> u32 {
        self.extent().height
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        self.renderer.aspect_ratio().unwrap_or(1.0)
    }

    /// Get the number of frames in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.renderer.frames_in_flight()
    }

    /// Total frames submitted.
    pub fn frame_count(&self) -> u64 {
        self.renderer.frame_count()
    }

    /// Release every GPU object. The device is idle afterwards.
    pub(crate) fn shutdown(self) -> anyhow::Result<()> {
        let Self {
            window, renderer, ..
        } = self;
        // Dropping the backend destroys the command pool, surface, device and
        // instance in that order; the window must still be alive for that.
        let backend = renderer.shutdown()?;
        drop(backend);
        drop(window);
        Ok(())
    }
}
