//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
///
/// Soft swapchain conditions (out-of-date, suboptimal) are not errors; they are
/// reported through [`crate::AcquireResult`] and [`crate::SwapchainStatus`].
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// The surface offers no usable format, present mode, or depth format.
    #[error("Surface unsupported: {0}")]
    SurfaceUnsupported(String),

    /// A GPU object could not be created.
    #[error("Failed to create {what}: {source}")]
    ResourceCreation {
        what: &'static str,
        #[source]
        source: vk::Result,
    },

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Acquiring a swapchain image failed with a non-recoverable status.
    #[error("Failed to acquire swapchain image: {0}")]
    AcquireFailed(vk::Result),

    /// Queue submission failed.
    #[error("Failed to submit command buffer: {0}")]
    SubmissionFailed(vk::Result),

    /// Presentation failed with a non-recoverable status.
    #[error("Failed to present swapchain image: {0}")]
    PresentationFailed(vk::Result),

    /// A rebuilt swapchain changed its colour or depth format.
    #[error(
        "Swapchain formats changed across rebuild (color {old_color:?} -> {new_color:?}, depth {old_depth:?} -> {new_depth:?})"
    )]
    IncompatibleFormats {
        old_color: vk::Format,
        new_color: vk::Format,
        old_depth: vk::Format,
        new_depth: vk::Format,
    },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Build a `map_err` adapter for a failed creation call.
    pub fn creation(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |source| Self::ResourceCreation { what, source }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
