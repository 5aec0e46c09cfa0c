//! Frame orchestration: acquire, record, submit, present, rebuild.

use crate::config::RendererConfig;
use crate::frame_sync::FrameSynchronizer;
use crate::surface::{is_drawable, PresentationSurface};
use crate::swapchain_manager::{GenerationInfo, SwapchainManager};
use ash::vk;
use swapframe_gpu::{
    AcquireResult, FrameBackend, FrameSubmission, GpuError, RenderPassBegin, Result, NO_TIMEOUT,
};

/// Outcome of [`Renderer::recreate_swapchain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// A new generation is ready.
    Rebuilt,
    /// The drawable extent is zero and the surface cannot block; the rebuild
    /// stays pending.
    Deferred,
}

#[derive(Debug, Clone, Copy)]
struct FrameInProgress {
    slot: usize,
    image_index: u32,
    command_buffer: vk::CommandBuffer,
    render_pass_open: bool,
}

/// Drives the per-frame protocol over a [`FrameBackend`].
///
/// ```text
/// if let Some(cmd) = renderer.begin_frame(&mut surface)? {
///     renderer.begin_render_pass(cmd)?;
///     // record draws
///     renderer.end_render_pass(cmd)?;
///     renderer.end_frame(&mut surface)?;
/// }
/// ```
///
/// `begin_frame` returns `None` when no frame can be drawn this iteration:
/// the swapchain was out of date and has just been rebuilt, or the window is
/// minimized. The caller simply tries again next iteration.
///
/// Call [`Renderer::shutdown`] to release GPU objects; dropping a renderer
/// leaks them.
pub struct Renderer<B: FrameBackend> {
    backend: B,
    swapchain: Option<SwapchainManager<B>>,
    sync: FrameSynchronizer,
    config: RendererConfig,
    last_generation: Option<GenerationInfo>,
    frame_count: u64,
    frame: Option<FrameInProgress>,
    needs_rebuild: bool,
}

impl<B: FrameBackend> Renderer<B> {
    /// Create frame slots and the first swapchain generation.
    ///
    /// A surface that is minimized at startup and cannot block leaves the
    /// first build pending until the first `begin_frame` with a visible window.
    pub fn new<S: PresentationSurface>(
        mut backend: B,
        surface: &mut S,
        config: RendererConfig,
    ) -> Result<Self> {
        config.validate()?;
        let sync = FrameSynchronizer::new(&mut backend, config.frames_in_flight)?;

        let mut renderer = Self {
            backend,
            swapchain: None,
            sync,
            config,
            last_generation: None,
            frame_count: 0,
            frame: None,
            needs_rebuild: false,
        };

        if let Err(e) = renderer.recreate_swapchain(surface) {
            if let Err(cleanup) = renderer.release() {
                tracing::warn!("Cleanup after failed renderer creation: {cleanup}");
            }
            return Err(e);
        }

        Ok(renderer)
    }

    /// Start a frame and return its command buffer, already recording.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn begin_frame<S: PresentationSurface>(
        &mut self,
        surface: &mut S,
    ) -> Result<Option<vk::CommandBuffer>> {
        if self.frame.is_some() {
            return Err(GpuError::InvalidState(
                "begin_frame called while a frame is already in progress".to_string(),
            ));
        }

        if (self.needs_rebuild || self.swapchain.is_none())
            && self.recreate_swapchain(surface)? == RebuildOutcome::Deferred
        {
            return Ok(None);
        }

        let slot = self.frame_index();
        self.sync.wait_for_slot(&mut self.backend, slot)?;

        let swapchain = self.swapchain.as_ref().ok_or_else(no_swapchain)?;
        let image_available = self.sync.slot(slot).image_available;
        let image_index =
            match swapchain.acquire_next(&mut self.backend, image_available, NO_TIMEOUT)? {
                AcquireResult::Ready(index) => index,
                AcquireResult::Suboptimal(index) => {
                    if self.config.rebuild_on_suboptimal {
                        self.needs_rebuild = true;
                    }
                    index
                }
                AcquireResult::OutOfDate => {
                    self.recreate_swapchain(surface)?;
                    return Ok(None);
                }
            };

        self.sync
            .wait_for_image(&mut self.backend, image_index, slot)?;
        self.sync.track_image_fence(image_index, slot)?;
        self.sync.reset_slot(&mut self.backend, slot)?;

        let command_buffer = self.sync.slot(slot).command_buffer;
        self.backend.begin_command_buffer(command_buffer)?;

        self.frame = Some(FrameInProgress {
            slot,
            image_index,
            command_buffer,
            render_pass_open: false,
        });
        Ok(Some(command_buffer))
    }

    /// Begin the swapchain render pass on the frame's command buffer.
    ///
    /// Clears colour and depth and sets a full-extent viewport and scissor.
    pub fn begin_render_pass(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        let frame = self.frame_for(cmd)?;
        if frame.render_pass_open {
            return Err(GpuError::InvalidState(
                "Render pass already begun for this frame".to_string(),
            ));
        }

        let swapchain = self.swapchain.as_ref().ok_or_else(no_swapchain)?;
        let framebuffer = swapchain.framebuffer(frame.image_index).ok_or_else(|| {
            GpuError::InvalidState(format!("No framebuffer for image {}", frame.image_index))
        })?;
        let begin = RenderPassBegin {
            render_pass: swapchain.render_pass(),
            framebuffer,
            extent: swapchain.extent(),
            clear_color: self.config.clear_color,
            clear_depth: 1.0,
            clear_stencil: 0,
        };
        self.backend.cmd_begin_render_pass(cmd, &begin);

        if let Some(frame) = self.frame.as_mut() {
            frame.render_pass_open = true;
        }
        Ok(())
    }

    /// End the swapchain render pass.
    pub fn end_render_pass(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        let frame = self.frame_for(cmd)?;
        if !frame.render_pass_open {
            return Err(GpuError::InvalidState(
                "end_render_pass without a matching begin_render_pass".to_string(),
            ));
        }
        self.backend.cmd_end_render_pass(cmd);

        if let Some(frame) = self.frame.as_mut() {
            frame.render_pass_open = false;
        }
        Ok(())
    }

    /// Submit the frame, present it and rebuild the swapchain if needed.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn end_frame<S: PresentationSurface>(&mut self, surface: &mut S) -> Result<()> {
        let frame = match self.frame {
            Some(frame) if frame.render_pass_open => {
                return Err(GpuError::InvalidState(
                    "end_frame called with the render pass still open".to_string(),
                ));
            }
            Some(frame) => frame,
            None => {
                return Err(GpuError::InvalidState(
                    "end_frame called without begin_frame".to_string(),
                ));
            }
        };
        self.frame = None;

        self.backend.end_command_buffer(frame.command_buffer)?;

        let slot = self.sync.slot(frame.slot);
        let wait_semaphores = [slot.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS];
        let signal_semaphores = [slot.render_finished];
        let submission = FrameSubmission {
            command_buffer: frame.command_buffer,
            wait_semaphores: &wait_semaphores,
            wait_stages: &wait_stages,
            signal_semaphores: &signal_semaphores,
            fence: slot.in_flight,
        };
        self.backend.submit(&submission)?;
        self.sync.mark_submitted(frame.slot)?;

        let swapchain = self.swapchain.as_ref().ok_or_else(no_swapchain)?;
        let status =
            swapchain.present(&mut self.backend, frame.image_index, signal_semaphores[0])?;

        self.frame_count += 1;

        let resized = surface.take_resized();
        if status.needs_rebuild() || resized || self.needs_rebuild {
            self.recreate_swapchain(surface)?;
        }
        Ok(())
    }

    /// Replace the current swapchain generation with one sized to the surface.
    ///
    /// Waits for the device to go idle, tears the old generation down and
    /// builds the next one. A zero drawable extent, or a zero current extent
    /// reported by the surface, blocks on the surface or, if it cannot block,
    /// defers the rebuild. The old generation is kept while deferred.
    pub fn recreate_swapchain<S: PresentationSurface>(
        &mut self,
        surface: &mut S,
    ) -> Result<RebuildOutcome> {
        if self.frame.is_some() {
            return Err(GpuError::InvalidState(
                "Cannot recreate the swapchain while a frame is in progress".to_string(),
            ));
        }

        let extent = loop {
            let extent = surface.drawable_extent();
            if is_drawable(extent)
                && is_drawable(SwapchainManager::resolve_extent(&self.backend, extent)?)
            {
                break extent;
            }
            if !surface.wait_events() {
                if !self.needs_rebuild {
                    tracing::debug!("Surface is minimized, deferring swapchain rebuild");
                }
                self.needs_rebuild = true;
                return Ok(RebuildOutcome::Deferred);
            }
        };

        self.backend.wait_idle()?;
        self.sync.device_idle();

        let previous = match self.swapchain.take() {
            Some(old) => {
                let info = old.info();
                old.teardown(&mut self.backend);
                Some(info)
            }
            None => self.last_generation,
        };

        let swapchain =
            SwapchainManager::build(&mut self.backend, extent, self.config.vsync, previous)?;

        if self.sync.tracked_images() != swapchain.image_count() && previous.is_some() {
            tracing::debug!(
                "Swapchain image count changed from {} to {}",
                self.sync.tracked_images(),
                swapchain.image_count()
            );
        }
        self.sync.resize_image_tracker(swapchain.image_count());

        self.last_generation = Some(swapchain.info());
        self.swapchain = Some(swapchain);
        self.needs_rebuild = false;
        Ok(RebuildOutcome::Rebuilt)
    }

    /// Wait for the GPU, destroy every frame slot and the swapchain, and
    /// hand the backend back.
    pub fn shutdown(mut self) -> Result<B> {
        self.release()?;
        Ok(self.backend)
    }

    fn release(&mut self) -> Result<()> {
        self.backend.wait_idle()?;
        self.sync.device_idle();
        self.frame = None;

        if let Some(swapchain) = self.swapchain.take() {
            swapchain.teardown(&mut self.backend);
        }
        let sync = std::mem::replace(&mut self.sync, FrameSynchronizer::empty());
        sync.destroy(&mut self.backend)
    }

    fn frame_for(&self, cmd: vk::CommandBuffer) -> Result<FrameInProgress> {
        match self.frame {
            Some(frame) if frame.command_buffer == cmd => Ok(frame),
            Some(_) => Err(GpuError::InvalidState(
                "Command buffer does not belong to the frame in progress".to_string(),
            )),
            None => Err(GpuError::InvalidState(
                "No frame in progress".to_string(),
            )),
        }
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.frame.is_some()
    }

    /// Command buffer of the frame in progress.
    pub fn current_command_buffer(&self) -> Option<vk::CommandBuffer> {
        self.frame.map(|frame| frame.command_buffer)
    }

    /// Image index acquired for the frame in progress.
    pub fn image_index(&self) -> Option<u32> {
        self.frame.map(|frame| frame.image_index)
    }

    /// Frame slot the next (or current) frame uses.
    pub fn frame_index(&self) -> usize {
        self.sync.slot_for_frame(self.frame_count)
    }

    /// Number of frames submitted so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn frames_in_flight(&self) -> usize {
        self.sync.frames_in_flight()
    }

    /// Whether a rebuild is scheduled for the next frame.
    pub fn rebuild_pending(&self) -> bool {
        self.needs_rebuild
    }

    pub fn swapchain(&self) -> Option<&SwapchainManager<B>> {
        self.swapchain.as_ref()
    }

    pub fn synchronizer(&self) -> &FrameSynchronizer {
        &self.sync
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(SwapchainManager::extent)
    }

    pub fn aspect_ratio(&self) -> Option<f32> {
        self.swapchain.as_ref().map(SwapchainManager::aspect_ratio)
    }

    pub fn render_pass(&self) -> Option<vk::RenderPass> {
        self.swapchain.as_ref().map(SwapchainManager::render_pass)
    }

    /// Current swapchain generation, or the last one if a rebuild is pending
    /// after a teardown.
    pub fn generation(&self) -> u64 {
        self.last_generation.map_or(0, |info| info.generation)
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Update the clear colour used by subsequent render passes.
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.config.clear_color = color;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

fn no_swapchain() -> GpuError {
    GpuError::InvalidState("No swapchain has been built".to_string())
}
