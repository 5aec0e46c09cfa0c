//! Frame-in-flight synchronization.

use ash::vk;
use swapframe_gpu::{FrameBackend, GpuError, Result, NO_TIMEOUT};

/// What the CPU knows about a slot's fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Fence reset and not yet submitted.
    Idle,
    /// Work submitted; the fence may still be unsignaled.
    Submitted,
    /// The fence was observed signaled; the slot's objects are free to reuse.
    Signaled,
}

/// Synchronization objects for one frame in flight.
#[derive(Debug)]
pub struct FrameSlot {
    pub in_flight: vk::Fence,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub command_buffer: vk::CommandBuffer,
    state: SlotState,
}

impl FrameSlot {
    pub fn state(&self) -> SlotState {
        self.state
    }
}

/// Owns every [`FrameSlot`] and the image-in-flight tracker.
///
/// Slots are created once and live until [`FrameSynchronizer::destroy`]. The
/// tracker maps each swapchain image to the slot whose fence last guarded it
/// and is resized whenever the swapchain is rebuilt.
#[derive(Debug)]
pub struct FrameSynchronizer {
    slots: Vec<FrameSlot>,
    images_in_flight: Vec<Option<usize>>,
}

impl FrameSynchronizer {
    /// Create `frames_in_flight` slots with signaled fences.
    pub fn new<B: FrameBackend>(backend: &mut B, frames_in_flight: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(GpuError::InvalidState(
                "At least one frame in flight is required".to_string(),
            ));
        }

        let command_buffers = backend.allocate_command_buffers(frames_in_flight as u32)?;
        let mut sync = Self {
            slots: Vec::with_capacity(frames_in_flight),
            images_in_flight: Vec::new(),
        };

        for command_buffer in &command_buffers {
            match Self::create_slot(backend, *command_buffer) {
                Ok(slot) => sync.slots.push(slot),
                Err(e) => {
                    for slot in sync.slots.drain(..) {
                        Self::destroy_slot(backend, &slot);
                    }
                    backend.free_command_buffers(&command_buffers);
                    return Err(e);
                }
            }
        }

        tracing::debug!("Created {} frame slots", frames_in_flight);
        Ok(sync)
    }

    /// A synchronizer without slots, standing in after the real one is destroyed.
    pub(crate) fn empty() -> Self {
        Self {
            slots: Vec::new(),
            images_in_flight: Vec::new(),
        }
    }

    fn create_slot<B: FrameBackend>(
        backend: &mut B,
        command_buffer: vk::CommandBuffer,
    ) -> Result<FrameSlot> {
        let image_available = backend.create_semaphore()?;
        let render_finished = match backend.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                backend.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        let in_flight = match backend.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                backend.destroy_semaphore(render_finished);
                backend.destroy_semaphore(image_available);
                return Err(e);
            }
        };

        Ok(FrameSlot {
            in_flight,
            image_available,
            render_finished,
            command_buffer,
            state: SlotState::Signaled,
        })
    }

    fn destroy_slot<B: FrameBackend>(backend: &mut B, slot: &FrameSlot) {
        backend.destroy_fence(slot.in_flight);
        backend.destroy_semaphore(slot.render_finished);
        backend.destroy_semaphore(slot.image_available);
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Slot used by a frame counter value.
    pub fn slot_for_frame(&self, frame: u64) -> usize {
        (frame % self.slots.len() as u64) as usize
    }

    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    /// Number of images the tracker currently covers.
    pub fn tracked_images(&self) -> usize {
        self.images_in_flight.len()
    }

    /// Slot whose fence guards `image_index`, if any.
    pub fn image_owner(&self, image_index: u32) -> Option<usize> {
        self.images_in_flight
            .get(image_index as usize)
            .copied()
            .flatten()
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot < self.slots.len() {
            Ok(())
        } else {
            Err(GpuError::InvalidState(format!(
                "Frame slot {slot} out of range for {} slots",
                self.slots.len()
            )))
        }
    }

    /// Block until the slot's previous submission has finished.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_for_slot<B: FrameBackend>(&mut self, backend: &mut B, slot: usize) -> Result<()> {
        self.check_slot(slot)?;
        let frame = &mut self.slots[slot];
        if frame.state == SlotState::Idle {
            // An armed fence with no submission would never signal.
            return Err(GpuError::InvalidState(format!(
                "Frame slot {slot} was reset but never submitted"
            )));
        }
        backend.wait_for_fence(frame.in_flight, NO_TIMEOUT)?;
        frame.state = SlotState::Signaled;
        Ok(())
    }

    /// Re-arm the slot's fence for a new submission.
    pub fn reset_slot<B: FrameBackend>(&mut self, backend: &mut B, slot: usize) -> Result<()> {
        self.check_slot(slot)?;
        let frame = &mut self.slots[slot];
        if frame.state != SlotState::Signaled {
            return Err(GpuError::InvalidState(format!(
                "Frame slot {slot} reset while {:?}",
                frame.state
            )));
        }
        backend.reset_fence(frame.in_flight)?;
        frame.state = SlotState::Idle;
        Ok(())
    }

    /// Record that the slot's fence now belongs to a queue submission.
    pub fn mark_submitted(&mut self, slot: usize) -> Result<()> {
        self.check_slot(slot)?;
        let frame = &mut self.slots[slot];
        if frame.state != SlotState::Idle {
            return Err(GpuError::InvalidState(format!(
                "Frame slot {slot} submitted while {:?}",
                frame.state
            )));
        }
        frame.state = SlotState::Submitted;
        Ok(())
    }

    /// Wait for whichever other slot last rendered to `image_index`.
    ///
    /// Needed when the swapchain has more images than there are slots, or
    /// images come back out of order.
    pub fn wait_for_image<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        image_index: u32,
        slot: usize,
    ) -> Result<()> {
        let Some(owner) = self.tracked(image_index)? else {
            return Ok(());
        };
        if owner == slot || self.slots[owner].state != SlotState::Submitted {
            return Ok(());
        }
        tracing::trace!("Image {image_index} still in flight on slot {owner}");
        self.wait_for_slot(backend, owner)
    }

    /// Mark `image_index` as guarded by `slot`'s fence.
    pub fn track_image_fence(&mut self, image_index: u32, slot: usize) -> Result<()> {
        self.check_slot(slot)?;
        self.tracked(image_index)?;
        self.images_in_flight[image_index as usize] = Some(slot);
        Ok(())
    }

    fn tracked(&self, image_index: u32) -> Result<Option<usize>> {
        self.images_in_flight
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| {
                GpuError::InvalidState(format!(
                    "Image {image_index} out of range for {} tracked images",
                    self.images_in_flight.len()
                ))
            })
    }

    /// Forget every tracked image and cover `image_count` images.
    pub fn resize_image_tracker(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
    }

    /// Record that the device went idle, so every submission has completed.
    pub fn device_idle(&mut self) {
        for slot in &mut self.slots {
            if slot.state == SlotState::Submitted {
                slot.state = SlotState::Signaled;
            }
        }
    }

    /// Wait on every slot with outstanding work.
    pub fn wait_all<B: FrameBackend>(&mut self, backend: &mut B) -> Result<()> {
        for index in 0..self.slots.len() {
            if self.slots[index].state == SlotState::Submitted {
                self.wait_for_slot(backend, index)?;
            }
        }
        Ok(())
    }

    /// Drain outstanding work and destroy every slot.
    pub fn destroy<B: FrameBackend>(mut self, backend: &mut B) -> Result<()> {
        self.wait_all(backend)?;

        let command_buffers: Vec<_> = self.slots.iter().map(|s| s.command_buffer).collect();
        for slot in &self.slots {
            Self::destroy_slot(backend, slot);
        }
        backend.free_command_buffers(&command_buffers);
        self.slots.clear();
        self.images_in_flight.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FenceState, MockBackend, Op};

    #[test]
    fn slots_start_signaled() {
        let mut backend = MockBackend::new();
        let sync = FrameSynchronizer::new(&mut backend, 2).unwrap();

        assert_eq!(sync.frames_in_flight(), 2);
        for slot in sync.slots() {
            assert_eq!(slot.state(), SlotState::Signaled);
            assert_eq!(backend.fence_state(slot.in_flight), Some(FenceState::Signaled));
            assert_ne!(slot.image_available, slot.render_finished);
        }
        assert_eq!(backend.live_of("fence"), 2);
        assert_eq!(backend.live_of("semaphore"), 4);
        assert_eq!(backend.live_of("command buffer"), 2);

        sync.destroy(&mut backend).unwrap();
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn zero_slots_rejected() {
        let mut backend = MockBackend::new();
        assert!(matches!(
            FrameSynchronizer::new(&mut backend, 0),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn slot_indices_cycle() {
        let mut backend = MockBackend::new();
        let sync = FrameSynchronizer::new(&mut backend, 2).unwrap();
        let slots: Vec<_> = (0..5).map(|f| sync.slot_for_frame(f)).collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        sync.destroy(&mut backend).unwrap();
    }

    #[test]
    fn reset_requires_signaled() {
        let mut backend = MockBackend::new();
        let mut sync = FrameSynchronizer::new(&mut backend, 1).unwrap();

        sync.reset_slot(&mut backend, 0).unwrap();
        assert_eq!(sync.slot(0).state(), SlotState::Idle);
        assert!(matches!(
            sync.reset_slot(&mut backend, 0),
            Err(GpuError::InvalidState(_))
        ));
        assert!(matches!(
            sync.wait_for_slot(&mut backend, 0),
            Err(GpuError::InvalidState(_))
        ));

        sync.mark_submitted(0).unwrap();
        assert!(matches!(
            sync.reset_slot(&mut backend, 0),
            Err(GpuError::InvalidState(_))
        ));
        assert!(matches!(sync.mark_submitted(0), Err(GpuError::InvalidState(_))));
        assert!(matches!(sync.mark_submitted(3), Err(GpuError::InvalidState(_))));
    }

    #[test]
    fn image_guard_waits_on_other_slot() {
        let mut backend = MockBackend::new();
        let mut sync = FrameSynchronizer::new(&mut backend, 2).unwrap();
        sync.resize_image_tracker(3);

        // slot 0 renders image 2 and is still in flight
        sync.reset_slot(&mut backend, 0).unwrap();
        sync.track_image_fence(2, 0).unwrap();
        let fence = sync.slot(0).in_flight;
        let cmd = sync.slot(0).command_buffer;
        backend
            .submit(&swapframe_gpu::FrameSubmission {
                command_buffer: cmd,
                wait_semaphores: &[],
                wait_stages: &[],
                signal_semaphores: &[],
                fence,
            })
            .unwrap();
        sync.mark_submitted(0).unwrap();
        backend.clear_ops();

        // slot 0 owns image 2 itself: nothing to wait on
        sync.wait_for_image(&mut backend, 2, 0).unwrap();
        assert!(backend.ops().is_empty());

        // untracked image: nothing to wait on
        sync.wait_for_image(&mut backend, 1, 1).unwrap();
        assert!(backend.ops().is_empty());

        sync.wait_for_image(&mut backend, 2, 1).unwrap();
        assert_eq!(backend.ops(), &[Op::WaitFence(fence)]);
        assert_eq!(sync.slot(0).state(), SlotState::Signaled);
        assert_eq!(sync.image_owner(2), Some(0));

        // already observed signaled: no second wait
        backend.clear_ops();
        sync.wait_for_image(&mut backend, 2, 1).unwrap();
        assert!(backend.ops().is_empty());

        assert!(matches!(
            sync.track_image_fence(3, 0),
            Err(GpuError::InvalidState(_))
        ));

        sync.resize_image_tracker(2);
        assert_eq!(sync.tracked_images(), 2);
        assert_eq!(sync.image_owner(0), None);

        sync.destroy(&mut backend).unwrap();
        assert!(backend.violations().is_empty(), "{:?}", backend.violations());
    }

    #[test]
    fn destroy_drains_pending_work() {
        let mut backend = MockBackend::new();
        let mut sync = FrameSynchronizer::new(&mut backend, 2).unwrap();
        for index in 0..2 {
            sync.reset_slot(&mut backend, index).unwrap();
            let slot = sync.slot(index);
            let (cmd, fence) = (slot.command_buffer, slot.in_flight);
            backend
                .submit(&swapframe_gpu::FrameSubmission {
                    command_buffer: cmd,
                    wait_semaphores: &[],
                    wait_stages: &[],
                    signal_semaphores: &[],
                    fence,
                })
                .unwrap();
            sync.mark_submitted(index).unwrap();
        }

        sync.destroy(&mut backend).unwrap();
        assert_eq!(backend.count_ops(|op| matches!(op, Op::WaitFence(_))), 2);
        assert_eq!(backend.live_count(), 0);
        assert!(backend.violations().is_empty(), "{:?}", backend.violations());
    }

    #[test]
    fn partial_creation_is_cleaned_up() {
        for (kind, successes) in [("command buffer", 1), ("semaphore", 3), ("fence", 1)] {
            let mut backend = MockBackend::new();
            backend.fail_after(kind, successes);
            assert!(FrameSynchronizer::new(&mut backend, 2).is_err());
            assert_eq!(backend.live_count(), 0, "leak after {kind} failure");
        }
    }
}
