//! Frame backend capability interface.
//!
//! [`FrameBackend`] is everything the swapchain manager, frame synchronizer and
//! renderer need from a device: GPU object creation, fence and semaphore
//! handling, command recording brackets, submission, acquire, present and a
//! device-idle wait. [`crate::VulkanBackend`] implements it on top of `ash`;
//! tests implement it in memory.
//!
//! All handles passed back into a backend must have been created by that same
//! backend and not yet destroyed.

use crate::error::Result;
use crate::surface::SurfaceCapabilities;
use ash::vk;

/// Timeout value meaning "wait forever".
pub const NO_TIMEOUT: u64 = u64::MAX;

/// Parameters for creating one swapchain.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// Outcome of acquiring a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// An image was acquired and the swapchain still matches the surface.
    Ready(u32),
    /// An image was acquired but the swapchain no longer matches the surface exactly.
    Suboptimal(u32),
    /// No image was acquired; the swapchain must be rebuilt.
    OutOfDate,
}

impl AcquireResult {
    /// The acquired image index, if any.
    pub fn image_index(self) -> Option<u32> {
        match self {
            Self::Ready(index) | Self::Suboptimal(index) => Some(index),
            Self::OutOfDate => None,
        }
    }
}

/// Outcome of a present request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    Success,
    Suboptimal,
    OutOfDate,
}

impl SwapchainStatus {
    /// Whether this status asks for the swapchain to be rebuilt.
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// One queue submission for a frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameSubmission<'a> {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphores: &'a [vk::Semaphore],
    pub wait_stages: &'a [vk::PipelineStageFlags],
    pub signal_semaphores: &'a [vk::Semaphore],
    pub fence: vk::Fence,
}

/// Parameters for beginning the swapchain render pass.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

/// Device and presentation operations consumed by the frame loop.
pub trait FrameBackend {
    /// Backend-owned depth image (image plus its memory).
    type DepthImage;

    /// Query the surface's capabilities, formats and present modes.
    fn surface_support(&self) -> Result<SurfaceCapabilities>;

    /// Whether `format` can be used as an optimal-tiling depth/stencil attachment.
    fn supports_depth_format(&self, format: vk::Format) -> bool;

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR>;

    /// The presentable images owned by `swapchain`.
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>>;

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR);

    fn create_image_view(
        &mut self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView>;

    fn destroy_image_view(&mut self, view: vk::ImageView);

    fn create_depth_image(
        &mut self,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> Result<Self::DepthImage>;

    /// Raw image handle of a depth image, for view creation.
    fn depth_image_handle(image: &Self::DepthImage) -> vk::Image;

    fn destroy_depth_image(&mut self, image: Self::DepthImage);

    /// Create the single-subpass colour + depth render pass used for every frame.
    fn create_render_pass(
        &mut self,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<vk::RenderPass>;

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass);

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer>;

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer);

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence>;

    fn destroy_fence(&mut self, fence: vk::Fence);

    /// Block until `fence` is signaled.
    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> Result<()>;

    /// Return `fence` to the unsignaled state.
    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()>;

    fn create_semaphore(&mut self) -> Result<vk::Semaphore>;

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);

    fn allocate_command_buffers(&mut self, count: u32) -> Result<Vec<vk::CommandBuffer>>;

    fn free_command_buffers(&mut self, command_buffers: &[vk::CommandBuffer]);

    /// Reset `cmd` and begin one-time-submit recording.
    fn begin_command_buffer(&mut self, cmd: vk::CommandBuffer) -> Result<()>;

    fn end_command_buffer(&mut self, cmd: vk::CommandBuffer) -> Result<()>;

    /// Begin the render pass and set a full-extent viewport and scissor.
    fn cmd_begin_render_pass(&mut self, cmd: vk::CommandBuffer, begin: &RenderPassBegin);

    fn cmd_end_render_pass(&mut self, cmd: vk::CommandBuffer);

    /// Submit to the graphics queue.
    fn submit(&mut self, submission: &FrameSubmission<'_>) -> Result<()>;

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> Result<AcquireResult>;

    /// Queue `image_index` for presentation once `wait_semaphore` is signaled.
    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<SwapchainStatus>;

    /// Block until every queue of the device is idle.
    fn wait_idle(&mut self) -> Result<()>;
}
