//! Per-frame context for rendering.

use ash::vk;

/// Context for the current frame being rendered.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    /// Command buffer, recording inside the swapchain render pass.
    pub command_buffer: vk::CommandBuffer,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// Frame slot in use.
    pub frame_index: usize,
    /// Swapchain extent for this frame.
    pub extent: vk::Extent2D,
    /// Delta time since last frame in seconds.
    pub dt: f32,
    /// Current frame number.
    pub frame_number: u64,
}

impl FrameContext {
    /// Create a new frame context.
    pub(crate) fn new(
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        frame_index: usize,
        extent: vk::Extent2D,
        dt: f32,
        frame_number: u64,
    ) -> Self {
        Self {
            command_buffer,
            image_index,
            frame_index,
            extent,
            dt,
            frame_number,
        }
    }
}
