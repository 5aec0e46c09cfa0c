//! [`FrameBackend`] implementation on top of a [`GpuContext`] and a window surface.

use crate::backend::{
    AcquireResult, FrameBackend, FrameSubmission, RenderPassBegin, SwapchainDesc, SwapchainStatus,
};
use crate::command::{self, CommandPool};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::{depth_image_info, GpuImage};
use crate::render_pass;
use crate::surface::{SurfaceCapabilities, SurfaceContext};
use crate::swapchain;
use crate::sync;
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Vulkan device context for one presentation surface.
///
/// Owns the surface and the command pool the frame command buffers come from.
/// Every method assumes the handles it receives were created through this
/// backend; that is what makes the internal `unsafe` calls sound.
pub struct VulkanBackend {
    command_pool: CommandPool,
    surface: SurfaceContext,
    gpu: GpuContext,
}

impl VulkanBackend {
    /// Create a backend for an existing GPU context and surface.
    pub fn new(gpu: GpuContext, surface: SurfaceContext) -> Result<Self> {
        // SAFETY: the device is valid and the family was used to create it
        let command_pool = match unsafe {
            CommandPool::new(
                gpu.device(),
                gpu.graphics_queue_family(),
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
        } {
            Ok(pool) => pool,
            Err(e) => {
                // SAFETY: nothing has been created against the surface yet
                unsafe { surface.destroy() };
                return Err(e);
            }
        };

        Ok(Self {
            command_pool,
            surface,
            gpu,
        })
    }

    /// The underlying GPU context.
    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    fn device(&self) -> &ash::Device {
        self.gpu.device()
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        // SAFETY: the renderer tears down every swapchain and frame slot before
        // handing the backend back, so nothing references the pool or surface.
        unsafe {
            let _ = self.gpu.wait_idle();
            self.command_pool.destroy(self.gpu.device());
            self.surface.destroy();
        }
    }
}

impl FrameBackend for VulkanBackend {
    type DepthImage = GpuImage;

    fn surface_support(&self) -> Result<SurfaceCapabilities> {
        self.surface.capabilities(&self.gpu)
    }

    fn supports_depth_format(&self, format: vk::Format) -> bool {
        self.gpu.supports_depth_attachment(format)
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR> {
        // SAFETY: loader and surface belong to this backend
        unsafe {
            swapchain::create_swapchain(
                &self.surface.swapchain_loader,
                self.surface.surface,
                desc,
                self.gpu.graphics_queue_family(),
            )
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        // SAFETY: swapchain was created by this backend
        unsafe { self.surface.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(GpuError::creation("swapchain images"))
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        // SAFETY: caller guarantees the swapchain is idle
        unsafe {
            self.surface
                .swapchain_loader
                .destroy_swapchain(swapchain, None);
        }
    }

    fn create_image_view(
        &mut self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        // SAFETY: image belongs to this device
        unsafe { self.device().create_image_view(&view_info, None) }
            .map_err(GpuError::creation("image view"))
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        // SAFETY: caller guarantees the view is idle
        unsafe { self.device().destroy_image_view(view, None) };
    }

    fn create_depth_image(
        &mut self,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> Result<Self::DepthImage> {
        self.gpu.allocator().lock().create_image(
            &depth_image_info(extent, format),
            MemoryLocation::GpuOnly,
            "swapchain depth",
        )
    }

    fn depth_image_handle(image: &Self::DepthImage) -> vk::Image {
        image.image
    }

    fn destroy_depth_image(&mut self, mut image: Self::DepthImage) {
        if let Err(e) = self.gpu.allocator().lock().free_image(&mut image) {
            tracing::warn!("Failed to free depth image: {e}");
        }
    }

    fn create_render_pass(
        &mut self,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<vk::RenderPass> {
        // SAFETY: device is valid
        unsafe { render_pass::create_render_pass(self.device(), color_format, depth_format) }
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        // SAFETY: caller guarantees no framebuffer or command buffer still uses it
        unsafe { self.device().destroy_render_pass(render_pass, None) };
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer> {
        // SAFETY: handles belong to this device
        unsafe { render_pass::create_framebuffer(self.device(), render_pass, attachments, extent) }
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        // SAFETY: caller guarantees the framebuffer is idle
        unsafe { self.device().destroy_framebuffer(framebuffer, None) };
    }

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence> {
        // SAFETY: device is valid
        unsafe { sync::create_fence(self.device(), signaled) }
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        // SAFETY: caller guarantees the fence is not pending
        unsafe { self.device().destroy_fence(fence, None) };
    }

    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
        // SAFETY: fence belongs to this device
        unsafe { sync::wait_for_fence(self.device(), fence, timeout_ns) }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        // SAFETY: fence belongs to this device and is not pending
        unsafe { sync::reset_fence(self.device(), fence) }
    }

    fn create_semaphore(&mut self) -> Result<vk::Semaphore> {
        // SAFETY: device is valid
        unsafe { sync::create_semaphore(self.device()) }
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        // SAFETY: caller guarantees the semaphore is not pending
        unsafe { self.device().destroy_semaphore(semaphore, None) };
    }

    fn allocate_command_buffers(&mut self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        // SAFETY: device is valid
        unsafe {
            self.command_pool
                .allocate_command_buffers(self.gpu.device(), count)
        }
    }

    fn free_command_buffers(&mut self, command_buffers: &[vk::CommandBuffer]) {
        // SAFETY: buffers come from this pool; caller guarantees they are idle
        unsafe {
            self.command_pool
                .free_command_buffers(self.gpu.device(), command_buffers);
        }
    }

    fn begin_command_buffer(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        // SAFETY: caller guarantees the slot fence was waited on
        unsafe {
            command::begin_command_buffer(
                self.device(),
                cmd,
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            )
        }
    }

    fn end_command_buffer(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        // SAFETY: cmd is recording
        unsafe { command::end_command_buffer(self.device(), cmd) }
    }

    fn cmd_begin_render_pass(&mut self, cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        // SAFETY: cmd is recording outside a render pass
        unsafe { render_pass::cmd_begin_render_pass(self.device(), cmd, begin) };
    }

    fn cmd_end_render_pass(&mut self, cmd: vk::CommandBuffer) {
        // SAFETY: cmd is inside the render pass it began
        unsafe { self.device().cmd_end_render_pass(cmd) };
    }

    fn submit(&mut self, submission: &FrameSubmission<'_>) -> Result<()> {
        // SAFETY: every handle in the submission belongs to this device
        unsafe { command::submit_frame(self.device(), self.gpu.graphics_queue(), submission) }
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> Result<AcquireResult> {
        // SAFETY: swapchain and semaphore belong to this backend
        unsafe {
            swapchain::acquire_next_image(
                &self.surface.swapchain_loader,
                swapchain,
                semaphore,
                timeout_ns,
            )
        }
    }

    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<SwapchainStatus> {
        // SAFETY: swapchain and semaphore belong to this backend
        unsafe {
            swapchain::present(
                &self.surface.swapchain_loader,
                self.gpu.graphics_queue(),
                swapchain,
                image_index,
                &[wait_semaphore],
            )
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.gpu.wait_idle()
    }
}
