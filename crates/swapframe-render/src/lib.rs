//! Swapchain lifecycle and frame pacing for swapframe.
//!
//! This crate provides:
//! - [`SwapchainManager`]: one generation of presentable images, depth
//!   resources, render pass and framebuffers
//! - [`FrameSynchronizer`]: per-frame-in-flight fences, semaphores and command
//!   buffers plus the image-in-flight tracker
//! - [`Renderer`]: the `begin_frame` / `end_frame` protocol that drives
//!   acquisition, submission, presentation and swapchain recreation
//!
//! Everything is generic over [`swapframe_gpu::FrameBackend`], so the frame
//! loop runs the same against Vulkan and against an in-memory backend.

pub mod config;
pub mod frame_sync;
pub mod renderer;
pub mod surface;
pub mod swapchain_manager;

#[cfg(test)]
mod mock;

pub use config::{RendererConfig, DEFAULT_FRAMES_IN_FLIGHT, MAX_FRAMES_IN_FLIGHT};
pub use frame_sync::{FrameSlot, FrameSynchronizer, SlotState};
pub use renderer::{RebuildOutcome, Renderer};
pub use surface::PresentationSurface;
pub use swapchain_manager::{
    DepthResource, GenerationInfo, PresentableImage, SwapchainFormats, SwapchainManager,
};
