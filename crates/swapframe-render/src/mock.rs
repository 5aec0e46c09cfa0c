//! In-memory backend and surface for exercising the frame loop without a GPU.
//!
//! The backend hands out fabricated handles, keeps a log of every operation
//! and simulates fences with instant GPU completion: a submitted fence stays
//! pending until someone waits on it or on the device. Protocol mistakes that
//! a real driver would punish (resetting a pending fence, re-recording a busy
//! command buffer, destroying objects while work is in flight) are collected
//! as violations instead of panicking, so tests can assert there are none.

use crate::surface::PresentationSurface;
use ash::vk::{self, Handle};
use std::collections::{HashMap, HashSet, VecDeque};
use swapframe_gpu::{
    AcquireResult, FrameBackend, FrameSubmission, GpuError, RenderPassBegin, Result,
    SurfaceCapabilities, SwapchainDesc, SwapchainStatus,
};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    CreateSwapchain {
        extent: vk::Extent2D,
        image_count: u32,
        format: vk::Format,
        present_mode: vk::PresentModeKHR,
    },
    DestroySwapchain(vk::SwapchainKHR),
    CreateRenderPass {
        color: vk::Format,
        depth: vk::Format,
    },
    DestroyRenderPass(vk::RenderPass),
    CreateImageView(vk::ImageView),
    DestroyImageView(vk::ImageView),
    CreateDepthImage(vk::Extent2D),
    DestroyDepthImage(vk::Image),
    CreateFramebuffer(vk::Framebuffer),
    DestroyFramebuffer(vk::Framebuffer),
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    BeginRenderPass {
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    },
    EndRenderPass(vk::CommandBuffer),
    Submit {
        cmd: vk::CommandBuffer,
        fence: vk::Fence,
        wait: Vec<vk::Semaphore>,
        wait_stages: Vec<vk::PipelineStageFlags>,
        signal: Vec<vk::Semaphore>,
    },
    Acquire(AcquireResult),
    Present {
        image_index: u32,
        wait: vk::Semaphore,
        status: SwapchainStatus,
    },
    WaitIdle,
}

/// A scripted status for the next acquire or present.
#[derive(Debug, Clone, Copy)]
pub enum Scripted {
    Suboptimal,
    OutOfDate,
    Fail(vk::Result),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

#[derive(Debug, Clone, Copy)]
pub struct MockDepthImage {
    pub image: vk::Image,
}

struct MockSwapchain {
    images: Vec<vk::Image>,
    next_image: u32,
}

pub struct MockBackend {
    pub support: SurfaceCapabilities,
    pub depth_formats: Vec<vk::Format>,
    ops: Vec<Op>,
    violations: Vec<String>,
    next_handle: u64,
    live: HashMap<u64, &'static str>,
    created: HashMap<&'static str, usize>,
    fail_on: Option<(&'static str, usize)>,
    fences: HashMap<vk::Fence, FenceState>,
    command_fences: HashMap<vk::CommandBuffer, vk::Fence>,
    signaled_semaphores: HashSet<vk::Semaphore>,
    swapchains: HashMap<vk::SwapchainKHR, MockSwapchain>,
    acquire_script: VecDeque<Scripted>,
    present_script: VecDeque<Scripted>,
}

impl MockBackend {
    /// Surface with `{min=2, max=3}` images, an undefined current extent and
    /// both FIFO and MAILBOX available.
    pub fn new() -> Self {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };

        Self {
            support: SurfaceCapabilities {
                capabilities,
                formats: vec![
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_UNORM,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_SRGB,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                ],
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            },
            depth_formats: vec![
                vk::Format::D32_SFLOAT,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
            ],
            ops: Vec::new(),
            violations: Vec::new(),
            next_handle: 0x1000,
            live: HashMap::new(),
            created: HashMap::new(),
            fail_on: None,
            fences: HashMap::new(),
            command_fences: HashMap::new(),
            signaled_semaphores: HashSet::new(),
            swapchains: HashMap::new(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
        }
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// Number of objects created and not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_of(&self, kind: &str) -> usize {
        self.live.values().filter(|k| **k == kind).count()
    }

    /// Fail the creation of `kind` once `successes` objects of that kind exist.
    pub fn fail_after(&mut self, kind: &'static str, successes: usize) {
        self.fail_on = Some((kind, successes));
    }

    pub fn script_acquire(&mut self, status: Scripted) {
        self.acquire_script.push_back(status);
    }

    pub fn script_present(&mut self, status: Scripted) {
        self.present_script.push_back(status);
    }

    pub fn fence_state(&self, fence: vk::Fence) -> Option<FenceState> {
        self.fences.get(&fence).copied()
    }

    pub fn count_ops(&self, pred: impl Fn(&Op) -> bool) -> usize {
        self.ops.iter().filter(|op| pred(op)).count()
    }

    fn create(&mut self, kind: &'static str) -> Result<u64> {
        let count = self.created.entry(kind).or_insert(0);
        if self.fail_on == Some((kind, *count)) {
            self.fail_on = None;
            return Err(GpuError::ResourceCreation {
                what: kind,
                source: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            });
        }
        *count += 1;
        self.next_handle += 1;
        self.live.insert(self.next_handle, kind);
        Ok(self.next_handle)
    }

    fn release(&mut self, raw: u64, kind: &'static str) {
        if self.live.remove(&raw).is_none() {
            self.violations
                .push(format!("destroyed unknown or dead {kind} {raw:#x}"));
        }
    }

    fn require_idle(&mut self, what: &str) {
        if self.fences.values().any(|state| *state == FenceState::Pending) {
            self.violations
                .push(format!("destroyed {what} while GPU work was pending"));
        }
    }

    fn next_scripted(script: &mut VecDeque<Scripted>) -> Option<Scripted> {
        script.pop_front()
    }
}

impl FrameBackend for MockBackend {
    type DepthImage = MockDepthImage;

    fn surface_support(&self) -> Result<SurfaceCapabilities> {
        Ok(self.support.clone())
    }

    fn supports_depth_format(&self, format: vk::Format) -> bool {
        self.depth_formats.contains(&format)
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            self.violations
                .push(format!("swapchain created with zero extent {:?}", desc.extent));
        }
        let handle = vk::SwapchainKHR::from_raw(self.create("swapchain")?);
        let images = (0..desc.min_image_count)
            .map(|_| {
                self.next_handle += 1;
                vk::Image::from_raw(self.next_handle)
            })
            .collect();
        self.swapchains.insert(
            handle,
            MockSwapchain {
                images,
                next_image: 0,
            },
        );
        self.ops.push(Op::CreateSwapchain {
            extent: desc.extent,
            image_count: desc.min_image_count,
            format: desc.surface_format.format,
            present_mode: desc.present_mode,
        });
        Ok(handle)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        self.swapchains
            .get(&swapchain)
            .map(|sc| sc.images.clone())
            .ok_or(GpuError::Vulkan(vk::Result::ERROR_UNKNOWN))
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        self.require_idle("swapchain");
        self.swapchains.remove(&swapchain);
        self.release(swapchain.as_raw(), "swapchain");
        self.ops.push(Op::DestroySwapchain(swapchain));
    }

    fn create_image_view(
        &mut self,
        _image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView> {
        let view = vk::ImageView::from_raw(self.create("image view")?);
        self.ops.push(Op::CreateImageView(view));
        Ok(view)
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        self.require_idle("image view");
        self.release(view.as_raw(), "image view");
        self.ops.push(Op::DestroyImageView(view));
    }

    fn create_depth_image(
        &mut self,
        extent: vk::Extent2D,
        _format: vk::Format,
    ) -> Result<Self::DepthImage> {
        let image = vk::Image::from_raw(self.create("depth image")?);
        self.ops.push(Op::CreateDepthImage(extent));
        Ok(MockDepthImage { image })
    }

    fn depth_image_handle(image: &Self::DepthImage) -> vk::Image {
        image.image
    }

    fn destroy_depth_image(&mut self, image: Self::DepthImage) {
        self.require_idle("depth image");
        self.release(image.image.as_raw(), "depth image");
        self.ops.push(Op::DestroyDepthImage(image.image));
    }

    fn create_render_pass(
        &mut self,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<vk::RenderPass> {
        let render_pass = vk::RenderPass::from_raw(self.create("render pass")?);
        self.ops.push(Op::CreateRenderPass {
            color: color_format,
            depth: depth_format,
        });
        Ok(render_pass)
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.require_idle("render pass");
        self.release(render_pass.as_raw(), "render pass");
        self.ops.push(Op::DestroyRenderPass(render_pass));
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer> {
        if !self.live.contains_key(&render_pass.as_raw())
            || attachments
                .iter()
                .any(|view| !self.live.contains_key(&view.as_raw()))
        {
            self.violations
                .push("framebuffer references a dead object".to_string());
        }
        let framebuffer = vk::Framebuffer::from_raw(self.create("framebuffer")?);
        self.ops.push(Op::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        self.require_idle("framebuffer");
        self.release(framebuffer.as_raw(), "framebuffer");
        self.ops.push(Op::DestroyFramebuffer(framebuffer));
    }

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence> {
        let fence = vk::Fence::from_raw(self.create("fence")?);
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        self.fences.insert(fence, state);
        Ok(fence)
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        if self.fences.remove(&fence) == Some(FenceState::Pending) {
            self.violations.push("destroyed a pending fence".to_string());
        }
        self.release(fence.as_raw(), "fence");
    }

    fn wait_for_fence(&mut self, fence: vk::Fence, _timeout_ns: u64) -> Result<()> {
        self.ops.push(Op::WaitFence(fence));
        match self.fences.get(&fence).copied() {
            Some(FenceState::Pending) => {
                self.fences.insert(fence, FenceState::Signaled);
            }
            Some(FenceState::Signaled) => {}
            Some(FenceState::Unsignaled) => self
                .violations
                .push("waited on a fence that was never submitted".to_string()),
            None => self.violations.push("waited on an unknown fence".to_string()),
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        self.ops.push(Op::ResetFence(fence));
        match self.fences.get(&fence).copied() {
            Some(FenceState::Pending) => self
                .violations
                .push("reset a fence with pending work".to_string()),
            Some(_) => {
                self.fences.insert(fence, FenceState::Unsignaled);
            }
            None => self.violations.push("reset an unknown fence".to_string()),
        }
        Ok(())
    }

    fn create_semaphore(&mut self) -> Result<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.create("semaphore")?))
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.signaled_semaphores.remove(&semaphore);
        self.release(semaphore.as_raw(), "semaphore");
    }

    fn allocate_command_buffers(&mut self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let mut buffers = Vec::new();
        for _ in 0..count {
            match self.create("command buffer") {
                Ok(raw) => buffers.push(vk::CommandBuffer::from_raw(raw)),
                Err(e) => {
                    self.free_command_buffers(&buffers);
                    return Err(e);
                }
            }
        }
        Ok(buffers)
    }

    fn free_command_buffers(&mut self, command_buffers: &[vk::CommandBuffer]) {
        for cmd in command_buffers {
            if let Some(fence) = self.command_fences.remove(cmd) {
                if self.fences.get(&fence) == Some(&FenceState::Pending) {
                    self.violations
                        .push("freed a command buffer with pending work".to_string());
                }
            }
            self.release(cmd.as_raw(), "command buffer");
        }
    }

    fn begin_command_buffer(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        if let Some(fence) = self.command_fences.get(&cmd) {
            if self.fences.get(fence) == Some(&FenceState::Pending) {
                self.violations
                    .push("re-recorded a command buffer with pending work".to_string());
            }
        }
        self.ops.push(Op::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn end_command_buffer(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        self.ops.push(Op::EndCommandBuffer(cmd));
        Ok(())
    }

    fn cmd_begin_render_pass(&mut self, cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.ops.push(Op::BeginRenderPass {
            cmd,
            framebuffer: begin.framebuffer,
            extent: begin.extent,
        });
    }

    fn cmd_end_render_pass(&mut self, cmd: vk::CommandBuffer) {
        self.ops.push(Op::EndRenderPass(cmd));
    }

    fn submit(&mut self, submission: &FrameSubmission<'_>) -> Result<()> {
        for semaphore in submission.wait_semaphores {
            if !self.signaled_semaphores.remove(semaphore) {
                self.violations
                    .push("submission waits on an unsignaled semaphore".to_string());
            }
        }
        match self.fences.get(&submission.fence).copied() {
            Some(FenceState::Unsignaled) => {
                self.fences.insert(submission.fence, FenceState::Pending);
            }
            _ => self
                .violations
                .push("submitted with a fence that was not reset".to_string()),
        }
        self.signaled_semaphores
            .extend(submission.signal_semaphores.iter().copied());
        self.command_fences
            .insert(submission.command_buffer, submission.fence);
        self.ops.push(Op::Submit {
            cmd: submission.command_buffer,
            fence: submission.fence,
            wait: submission.wait_semaphores.to_vec(),
            wait_stages: submission.wait_stages.to_vec(),
            signal: submission.signal_semaphores.to_vec(),
        });
        Ok(())
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> Result<AcquireResult> {
        let scripted = Self::next_scripted(&mut self.acquire_script);
        if let Some(Scripted::Fail(code)) = scripted {
            return Err(GpuError::AcquireFailed(code));
        }
        if matches!(scripted, Some(Scripted::OutOfDate)) {
            self.ops.push(Op::Acquire(AcquireResult::OutOfDate));
            return Ok(AcquireResult::OutOfDate);
        }

        let Some(sc) = self.swapchains.get_mut(&swapchain) else {
            self.violations
                .push("acquired from a destroyed swapchain".to_string());
            return Err(GpuError::AcquireFailed(vk::Result::ERROR_SURFACE_LOST_KHR));
        };
        let index = sc.next_image;
        sc.next_image = (sc.next_image + 1) % sc.images.len() as u32;

        if !self.signaled_semaphores.insert(semaphore) {
            self.violations
                .push("acquire signals a semaphore that is already signaled".to_string());
        }

        let result = if matches!(scripted, Some(Scripted::Suboptimal)) {
            AcquireResult::Suboptimal(index)
        } else {
            AcquireResult::Ready(index)
        };
        self.ops.push(Op::Acquire(result));
        Ok(result)
    }

    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<SwapchainStatus> {
        if !self.swapchains.contains_key(&swapchain) {
            self.violations
                .push("presented to a destroyed swapchain".to_string());
        }
        if !self.signaled_semaphores.remove(&wait_semaphore) {
            self.violations
                .push("present waits on an unsignaled semaphore".to_string());
        }
        let status = match Self::next_scripted(&mut self.present_script) {
            Some(Scripted::Fail(code)) => return Err(GpuError::PresentationFailed(code)),
            Some(Scripted::OutOfDate) => SwapchainStatus::OutOfDate,
            Some(Scripted::Suboptimal) => SwapchainStatus::Suboptimal,
            None => SwapchainStatus::Success,
        };
        self.ops.push(Op::Present {
            image_index,
            wait: wait_semaphore,
            status,
        });
        Ok(status)
    }

    fn wait_idle(&mut self) -> Result<()> {
        for state in self.fences.values_mut() {
            if *state == FenceState::Pending {
                *state = FenceState::Signaled;
            }
        }
        self.ops.push(Op::WaitIdle);
        Ok(())
    }
}

/// Scripted window surface.
pub struct MockSurface {
    pub extent: vk::Extent2D,
    pub resized: bool,
    /// Whether `wait_events` may block.
    pub can_block: bool,
    /// Extents delivered one per blocking `wait_events` call.
    pub pending_extents: VecDeque<vk::Extent2D>,
    pub waits: usize,
}

impl MockSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: vk::Extent2D { width, height },
            resized: false,
            can_block: false,
            pending_extents: VecDeque::new(),
            waits: 0,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.extent = vk::Extent2D { width, height };
        self.resized = true;
    }
}

impl PresentationSurface for MockSurface {
    fn drawable_extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn wait_events(&mut self) -> bool {
        self.waits += 1;
        if !self.can_block {
            return false;
        }
        match self.pending_extents.pop_front() {
            Some(extent) => {
                self.extent = extent;
                self.resized = true;
                true
            }
            None => false,
        }
    }
}
