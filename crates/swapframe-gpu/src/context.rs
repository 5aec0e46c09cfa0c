//! GPU context management.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::surface::{create_window_surface, SurfaceContext};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Mutex<GpuAllocator>,

    pub(crate) graphics_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Get the graphics queue. Presentation uses the same queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Whether `format` supports optimal-tiling depth/stencil attachment use.
    pub fn supports_depth_attachment(&self, format: vk::Format) -> bool {
        // SAFETY: instance and physical device are valid for the context's lifetime
        let props = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        // SAFETY: the device is valid for the context's lifetime
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // SAFETY: the context is the last owner of the device and instance
        unsafe {
            let _ = self.device.device_wait_idle();

            // Shutdown allocator BEFORE destroying device
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "swapframe".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context and a presentation surface for `window`.
    ///
    /// The physical device and its queue family are chosen against the new
    /// surface, so the graphics queue is known to present to it.
    ///
    /// # Safety
    /// The window must have valid handles and outlive the returned surface.
    pub unsafe fn build_for_window<W>(self, window: &W) -> Result<(GpuContext, SurfaceContext)>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        // SAFETY: loading the system Vulkan library has no other preconditions
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();

        // SAFETY: the entry was just loaded
        let instance =
            unsafe { create_instance(&entry, &self.app_name, self.enable_validation, display) }?;

        // SAFETY: the instance carries the surface extensions for this display
        let surface = match unsafe { create_window_surface(&entry, &instance, window) } {
            Ok(surface) => surface,
            Err(e) => {
                // SAFETY: nothing else was created from the instance
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        // SAFETY: instance and surface are valid
        let parts = match unsafe { create_device_parts(&instance, &surface_loader, surface) } {
            Ok(parts) => parts,
            Err(e) => {
                // SAFETY: no device exists, so nothing references the surface
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &parts.device);

        let gpu = GpuContext {
            entry,
            instance,
            physical_device: parts.physical_device,
            device: parts.device,
            capabilities: parts.capabilities,
            allocator: Mutex::new(parts.allocator),
            graphics_queue_family: parts.queue_family,
            graphics_queue: parts.graphics_queue,
        };
        let surface = SurfaceContext {
            surface,
            surface_loader,
            swapchain_loader,
        };
        Ok((gpu, surface))
    }
}

/// Device-level objects created for one surface.
struct DeviceParts {
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    capabilities: GpuCapabilities,
    device: Arc<ash::Device>,
    graphics_queue: vk::Queue,
    allocator: GpuAllocator,
}

/// Pick a device that can present to `surface` and create it with its
/// allocator. On failure nothing created here is left behind.
///
/// # Safety
/// The instance and surface must be valid.
unsafe fn create_device_parts(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<DeviceParts> {
    // SAFETY: caller guarantees validity
    let selected = unsafe { select_physical_device(instance, surface_loader, surface) }?;

    // SAFETY: the device was enumerated from this instance
    let capabilities = unsafe { GpuCapabilities::query(instance, selected.physical_device) };
    if !capabilities.meets_requirements() {
        return Err(GpuError::NoSuitableDevice);
    }

    tracing::info!("Selected GPU: {}", capabilities.summary());

    // SAFETY: the queue family was selected on this device
    let (device, graphics_queue) =
        unsafe { create_device(instance, selected.physical_device, selected.queue_family) }?;
    let device = Arc::new(device);

    // SAFETY: instance, device and physical device are valid
    let allocator =
        match unsafe { GpuAllocator::new(instance, device.clone(), selected.physical_device) } {
            Ok(allocator) => allocator,
            Err(e) => {
                // SAFETY: nothing was created on the device yet
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };

    Ok(DeviceParts {
        physical_device: selected.physical_device,
        queue_family: selected.queue_family,
        capabilities,
        device,
        graphics_queue,
        allocator,
    })
}

/// Required device extensions.
fn required_device_extensions() -> Vec<&'static CStr> {
    vec![
        ash::khr::swapchain::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_subset::NAME,
    ]
}

/// Create the logical device and retrieve the graphics queue.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    graphics_queue_family: u32,
) -> Result<(ash::Device, vk::Queue)> {
    let queue_priority = 1.0_f32;
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority))];

    let extensions = required_device_extensions();
    let extension_names: Vec<*const c_char> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let features = vk::PhysicalDeviceFeatures::default();

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    // SAFETY: caller guarantees validity
    let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }
        .map_err(GpuError::creation("logical device"))?;

    // SAFETY: the family was requested with one queue
    let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

    Ok((device, graphics_queue))
}
