//! Vulkan instance creation.

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

/// Instance extensions needed to create a surface on `display`.
pub fn required_instance_extensions(display: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let mut extensions = ash_window::enumerate_required_extensions(display)
        .map_err(GpuError::creation("instance extension list"))?
        .to_vec();
    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
    Ok(extensions)
}

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan instance able to present to windows on `display`.
///
/// Missing validation layers are skipped with a warning.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
    display: RawDisplayHandle,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;
    let engine_name = c"swapframe";

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(engine_name)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_1);

    let extension_names = required_instance_extensions(display)?;

    let requested_layers = if enable_validation {
        validation_layers()
    } else {
        vec![]
    };

    // SAFETY: caller guarantees the entry is valid
    let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
    let layers: Vec<&CStr> = requested_layers
        .into_iter()
        .filter(|layer| {
            let found = available_layers
                .iter()
                .any(|props| props.layer_name_as_c_str().ok() == Some(*layer));
            if !found {
                tracing::warn!("Validation layer {:?} not available", layer);
            }
            found
        })
        .collect();

    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    // SAFETY: all pointers in create_info outlive this call
    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(GpuError::creation("instance"))?;

    Ok(instance)
}

/// A physical device together with the queue family used for both graphics
/// and presentation.
#[derive(Debug, Clone, Copy)]
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub queue_family: u32,
}

/// Select the best physical device that can present to `surface`.
///
/// Discrete GPUs win over integrated and virtual ones. A device qualifies only
/// if it supports the swapchain extension, has one queue family with both
/// graphics and present support, and reports at least one surface format and
/// present mode.
///
/// # Safety
/// The instance and surface must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<SelectedDevice> {
    // SAFETY: caller guarantees the instance is valid
    let devices = unsafe { instance.enumerate_physical_devices()? };

    devices
        .into_iter()
        .filter_map(|device| {
            // SAFETY: the device was just enumerated from this instance
            let queue_family =
                unsafe { find_present_queue_family(instance, surface_loader, device, surface) }?;
            // SAFETY: as above
            let score = unsafe { score_physical_device(instance, surface_loader, device, surface) };
            (score >= 0).then_some((
                score,
                SelectedDevice {
                    physical_device: device,
                    queue_family,
                },
            ))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, selected)| selected)
        .ok_or(GpuError::NoSuitableDevice)
}

/// First queue family with graphics support that can present to `surface`.
///
/// # Safety
/// All handles must be valid.
unsafe fn find_present_queue_family(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Option<u32> {
    // SAFETY: caller guarantees validity
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    (0..families.len() as u32).find(|&index| {
        if !families[index as usize]
            .queue_flags
            .contains(vk::QueueFlags::GRAPHICS)
        {
            return false;
        }
        // SAFETY: caller guarantees validity
        unsafe { surface_loader.get_physical_device_surface_support(device, index, surface) }
            .unwrap_or(false)
    })
}

/// Score a physical device for selection. Negative means unusable.
unsafe fn score_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> i32 {
    // SAFETY: caller guarantees validity
    let properties = unsafe { instance.get_physical_device_properties(device) };

    // SAFETY: caller guarantees validity
    let has_swapchain = unsafe { instance.enumerate_device_extension_properties(device) }
        .unwrap_or_default()
        .iter()
        .any(|ext| ext.extension_name_as_c_str().ok() == Some(ash::khr::swapchain::NAME));
    if !has_swapchain {
        return -1;
    }

    // SAFETY: caller guarantees validity
    let (formats, present_modes) = unsafe {
        (
            surface_loader
                .get_physical_device_surface_formats(device, surface)
                .unwrap_or_default(),
            surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .unwrap_or_default(),
        )
    };
    if formats.is_empty() || present_modes.is_empty() {
        return -1;
    }

    device_type_score(properties.device_type)
}

/// Preference order for device types.
fn device_type_score(device_type: vk::PhysicalDeviceType) -> i32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    }
}
