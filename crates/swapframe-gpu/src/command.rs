//! Command buffer management.

use crate::backend::FrameSubmission;
use crate::error::{GpuError, Result};
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        // SAFETY: caller guarantees the device is valid
        let pool = unsafe { device.create_command_pool(&create_info, None) }
            .map_err(GpuError::creation("command pool"))?;

        Ok(Self { pool })
    }

    /// Allocate primary command buffers.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffers(
        &self,
        device: &ash::Device,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        // SAFETY: caller guarantees the device is valid
        unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(GpuError::creation("command buffers"))
    }

    /// Return command buffers to the pool.
    ///
    /// # Safety
    /// The command buffers must come from this pool and not be in use.
    pub unsafe fn free_command_buffers(
        &self,
        device: &ash::Device,
        command_buffers: &[vk::CommandBuffer],
    ) {
        if command_buffers.is_empty() {
            return;
        }
        // SAFETY: caller guarantees the buffers are idle and belong to this pool
        unsafe { device.free_command_buffers(self.pool, command_buffers) };
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        // SAFETY: caller guarantees the pool is idle
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// Reset and begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid, and the buffer must not be pending.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    // SAFETY: caller guarantees the buffer is valid and not pending
    unsafe {
        device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        device.begin_command_buffer(cmd, &begin_info)?;
    }
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    // SAFETY: caller guarantees the buffer is recording
    unsafe { device.end_command_buffer(cmd)? };
    Ok(())
}

/// Submit one frame's command buffer to a queue.
///
/// # Safety
/// All handles must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn submit_frame(
    device: &ash::Device,
    queue: vk::Queue,
    submission: &FrameSubmission<'_>,
) -> Result<()> {
    let command_buffers = [submission.command_buffer];
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(&command_buffers)
        .wait_semaphores(submission.wait_semaphores)
        .wait_dst_stage_mask(submission.wait_stages)
        .signal_semaphores(submission.signal_semaphores);

    // SAFETY: caller guarantees all handles are valid
    unsafe { device.queue_submit(queue, &[submit_info], submission.fence) }
        .map_err(GpuError::SubmissionFailed)
}
