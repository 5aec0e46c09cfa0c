//! Vulkan device layer for swapframe.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - Surface and raw swapchain handling
//! - Depth image allocation via gpu-allocator
//! - Command buffer and synchronization helpers
//! - The [`FrameBackend`] capability trait and its Vulkan implementation

pub mod backend;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod error;
pub mod instance;
pub mod memory;
pub mod render_pass;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vulkan_backend;

pub use backend::{
    AcquireResult, FrameBackend, FrameSubmission, RenderPassBegin, SwapchainDesc,
    SwapchainStatus, NO_TIMEOUT,
};
pub use capabilities::{GpuCapabilities, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuImage};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use vulkan_backend::VulkanBackend;

pub use ash::vk;
