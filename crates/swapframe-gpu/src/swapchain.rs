//! Swapchain creation, acquire/present, and surface parameter selection.
//!
//! The `select_*` and `calculate_*` functions are pure: they depend only on
//! what the surface reports, so rebuilding against the same capabilities
//! always yields the same configuration.

use crate::backend::{AcquireResult, SwapchainDesc, SwapchainStatus};
use crate::error::{GpuError, Result};
use ash::vk;

/// Preferred colour format.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Create a swapchain.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn create_swapchain(
    swapchain_loader: &ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    desc: &SwapchainDesc,
    graphics_queue_family: u32,
) -> Result<vk::SwapchainKHR> {
    let queue_families = [graphics_queue_family];
    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(desc.min_image_count)
        .image_format(desc.surface_format.format)
        .image_color_space(desc.surface_format.color_space)
        .image_extent(desc.extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .queue_family_indices(&queue_families)
        .pre_transform(desc.pre_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(desc.present_mode)
        .clipped(true)
        .old_swapchain(vk::SwapchainKHR::null());

    // SAFETY: caller guarantees the loader and surface are valid
    unsafe { swapchain_loader.create_swapchain(&create_info, None) }
        .map_err(GpuError::creation("swapchain"))
}

/// Acquire the next image.
///
/// # Safety
/// All handles must be valid.
#[cfg_attr(
    feature = "profiling-tracy",
    tracing::instrument(level = "trace", skip_all)
)]
pub unsafe fn acquire_next_image(
    swapchain_loader: &ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    semaphore: vk::Semaphore,
    timeout_ns: u64,
) -> Result<AcquireResult> {
    // SAFETY: caller guarantees the handles are valid
    let result = unsafe {
        swapchain_loader.acquire_next_image(swapchain, timeout_ns, semaphore, vk::Fence::null())
    };

    match result {
        Ok((index, false)) => Ok(AcquireResult::Ready(index)),
        Ok((index, true)) => Ok(AcquireResult::Suboptimal(index)),
        // OUT_OF_DATE means no image was acquired; caller must recreate the swapchain.
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
        Err(e) => Err(GpuError::AcquireFailed(e)),
    }
}

/// Present an image.
///
/// # Safety
/// All handles must be valid.
#[cfg_attr(
    feature = "profiling-tracy",
    tracing::instrument(level = "trace", skip_all)
)]
pub unsafe fn present(
    swapchain_loader: &ash::khr::swapchain::Device,
    queue: vk::Queue,
    swapchain: vk::SwapchainKHR,
    image_index: u32,
    wait_semaphores: &[vk::Semaphore],
) -> Result<SwapchainStatus> {
    let swapchains = [swapchain];
    let image_indices = [image_index];

    let present_info = vk::PresentInfoKHR::default()
        .wait_semaphores(wait_semaphores)
        .swapchains(&swapchains)
        .image_indices(&image_indices);

    // SAFETY: caller guarantees the handles are valid
    let result = unsafe { swapchain_loader.queue_present(queue, &present_info) };

    match result {
        Ok(false) => Ok(SwapchainStatus::Success),
        Ok(true) => Ok(SwapchainStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
        Err(e) => Err(GpuError::PresentationFailed(e)),
    }
}

/// Select the best surface format.
///
/// Returns `None` when the surface reports no formats at all.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    // Prefer SRGB
    available
        .iter()
        .find(|format| {
            format.format == PREFERRED_SURFACE_FORMAT.format
                && format.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the best present mode.
///
/// Returns `None` when the surface reports no present modes at all.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    vsync: bool,
) -> Option<vk::PresentModeKHR> {
    if available.is_empty() {
        return None;
    }

    if !vsync && available.contains(&vk::PresentModeKHR::MAILBOX) {
        // Low latency triple buffering
        return Some(vk::PresentModeKHR::MAILBOX);
    }

    // FIFO is always supported
    Some(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Number of images to request: one more than the minimum, capped by the
/// maximum when the surface reports one (`0` means no cap).
pub fn calculate_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        image_count
    }
}

/// Pick the surface pre-transform, preferring identity.
pub fn select_pre_transform(
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::SurfaceTransformFlagsKHR {
    if capabilities
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        capabilities.current_transform
    }
}

/// Pick the first depth format from [`DEPTH_FORMAT_CANDIDATES`] accepted by `supported`.
pub fn select_depth_format(supported: impl Fn(vk::Format) -> bool) -> Option<vk::Format> {
    DEPTH_FORMAT_CANDIDATES
        .iter()
        .copied()
        .find(|&format| supported(format))
}

/// Whether a depth format carries a stencil aspect.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}
