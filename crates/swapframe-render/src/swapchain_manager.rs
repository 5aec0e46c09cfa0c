//! One generation of swapchain resources.

use ash::vk;
use swapframe_gpu::swapchain::{
    calculate_extent, calculate_image_count, has_stencil_component, select_depth_format,
    select_pre_transform,
};
use swapframe_gpu::{
    AcquireResult, FrameBackend, GpuError, Result, SwapchainDesc, SwapchainStatus,
};

use crate::surface::is_drawable;

/// Depth attachment for one presentable image.
pub struct DepthResource<D> {
    pub image: D,
    pub view: vk::ImageView,
    pub format: vk::Format,
}

impl<D> DepthResource<D> {
    fn create<B>(backend: &mut B, extent: vk::Extent2D, format: vk::Format) -> Result<Self>
    where
        B: FrameBackend<DepthImage = D>,
    {
        let image = backend.create_depth_image(extent, format)?;

        let aspect = if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        };
        let view = match backend.create_image_view(B::depth_image_handle(&image), format, aspect) {
            Ok(view) => view,
            Err(e) => {
                backend.destroy_depth_image(image);
                return Err(e);
            }
        };

        Ok(Self {
            image,
            view,
            format,
        })
    }

    fn destroy<B>(self, backend: &mut B)
    where
        B: FrameBackend<DepthImage = D>,
    {
        backend.destroy_image_view(self.view);
        backend.destroy_depth_image(self.image);
    }
}

/// A swapchain image with everything needed to render into it.
pub struct PresentableImage<D> {
    /// Owned by the swapchain; never destroyed directly.
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub depth: DepthResource<D>,
    pub framebuffer: vk::Framebuffer,
}

/// Colour and depth formats of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
}

impl SwapchainFormats {
    /// Whether a generation with `other` formats can replace one with `self`.
    ///
    /// Pipelines built against the render pass stay valid only while both
    /// formats are unchanged.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.color == other.color && self.depth == other.depth
    }
}

/// What a torn-down generation leaves behind for its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationInfo {
    pub generation: u64,
    pub formats: SwapchainFormats,
}

/// Swapchain, per-image views, depth resources and framebuffers, and the
/// render pass they share.
///
/// A manager is one generation. It is replaced wholesale on rebuild: the
/// caller tears the old one down before building the next, so two
/// generations never hold surface resources at the same time.
pub struct SwapchainManager<B: FrameBackend> {
    swapchain: vk::SwapchainKHR,
    images: Vec<PresentableImage<B::DepthImage>>,
    render_pass: vk::RenderPass,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    generation: u64,
}

impl<B: FrameBackend> SwapchainManager<B> {
    /// Build a generation for a drawable `extent`.
    ///
    /// `previous` is only consulted for format compatibility. On failure
    /// every object created by this call is destroyed before returning.
    pub fn build(
        backend: &mut B,
        extent: vk::Extent2D,
        vsync: bool,
        previous: Option<GenerationInfo>,
    ) -> Result<Self> {
        if !is_drawable(extent) {
            return Err(GpuError::InvalidState(format!(
                "Cannot build a swapchain for a zero extent {}x{}",
                extent.width, extent.height
            )));
        }

        let support = backend.surface_support()?;
        let surface_format = support.recommended_format().ok_or_else(|| {
            GpuError::SurfaceUnsupported("surface reports no formats".to_string())
        })?;
        let present_mode = support.recommended_present_mode(vsync).ok_or_else(|| {
            GpuError::SurfaceUnsupported("surface reports no present modes".to_string())
        })?;
        let depth_format = select_depth_format(|format| backend.supports_depth_format(format))
            .ok_or_else(|| {
                GpuError::SurfaceUnsupported("no supported depth attachment format".to_string())
            })?;

        let formats = SwapchainFormats {
            color: surface_format.format,
            depth: depth_format,
        };
        if let Some(previous) = previous {
            if !previous.formats.is_compatible(&formats) {
                return Err(GpuError::IncompatibleFormats {
                    old_color: previous.formats.color,
                    new_color: formats.color,
                    old_depth: previous.formats.depth,
                    new_depth: formats.depth,
                });
            }
        }

        let desc = SwapchainDesc {
            surface_format,
            present_mode,
            extent: calculate_extent(&support.capabilities, extent.width, extent.height),
            min_image_count: calculate_image_count(&support.capabilities),
            pre_transform: select_pre_transform(&support.capabilities),
        };
        if !is_drawable(desc.extent) {
            return Err(GpuError::InvalidState(format!(
                "Surface reports a zero extent {}x{}",
                desc.extent.width, desc.extent.height
            )));
        }

        let mut manager = Self {
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            render_pass: vk::RenderPass::null(),
            surface_format,
            depth_format,
            present_mode,
            extent: desc.extent,
            generation: previous.map_or(1, |p| p.generation + 1),
        };

        if let Err(e) = manager.allocate(backend, &desc) {
            manager.release(backend);
            return Err(e);
        }

        tracing::info!(
            "Created swapchain generation {}: {}x{}, {} images, {:?}, {:?}, depth {:?}",
            manager.generation,
            manager.extent.width,
            manager.extent.height,
            manager.images.len(),
            manager.surface_format.format,
            manager.present_mode,
            manager.depth_format,
        );

        Ok(manager)
    }

    /// The extent a swapchain built for a drawable `requested` extent would
    /// get: the surface's current extent when it defines one, otherwise
    /// `requested` clamped to the surface limits.
    ///
    /// Some platforms report a zero current extent while the window still
    /// has a size, so this can be zero even when `requested` is not.
    pub fn resolve_extent(backend: &B, requested: vk::Extent2D) -> Result<vk::Extent2D> {
        let support = backend.surface_support()?;
        Ok(calculate_extent(
            &support.capabilities,
            requested.width,
            requested.height,
        ))
    }

    fn allocate(&mut self, backend: &mut B, desc: &SwapchainDesc) -> Result<()> {
        self.swapchain = backend.create_swapchain(desc)?;
        let images = backend.swapchain_images(self.swapchain)?;

        self.render_pass = backend.create_render_pass(self.surface_format.format, self.depth_format)?;

        self.images.reserve(images.len());
        for image in images {
            let presentable = self.create_presentable(backend, image)?;
            self.images.push(presentable);
        }

        Ok(())
    }

    fn create_presentable(
        &self,
        backend: &mut B,
        image: vk::Image,
    ) -> Result<PresentableImage<B::DepthImage>> {
        let view = backend.create_image_view(
            image,
            self.surface_format.format,
            vk::ImageAspectFlags::COLOR,
        )?;

        let depth = match DepthResource::create(backend, self.extent, self.depth_format) {
            Ok(depth) => depth,
            Err(e) => {
                backend.destroy_image_view(view);
                return Err(e);
            }
        };

        let framebuffer =
            match backend.create_framebuffer(self.render_pass, &[view, depth.view], self.extent) {
                Ok(framebuffer) => framebuffer,
                Err(e) => {
                    depth.destroy(backend);
                    backend.destroy_image_view(view);
                    return Err(e);
                }
            };

        Ok(PresentableImage {
            image,
            view,
            depth,
            framebuffer,
        })
    }

    /// Destroy every object of this generation.
    ///
    /// The device must be idle.
    pub fn teardown(mut self, backend: &mut B) {
        self.release(backend);
    }

    fn release(&mut self, backend: &mut B) {
        for image in &self.images {
            backend.destroy_framebuffer(image.framebuffer);
        }
        if self.render_pass != vk::RenderPass::null() {
            backend.destroy_render_pass(self.render_pass);
            self.render_pass = vk::RenderPass::null();
        }
        let mut views = Vec::with_capacity(self.images.len());
        for image in self.images.drain(..) {
            image.depth.destroy(backend);
            views.push(image.view);
        }
        for view in views {
            backend.destroy_image_view(view);
        }
        if self.swapchain != vk::SwapchainKHR::null() {
            backend.destroy_swapchain(self.swapchain);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }

    /// Acquire the next presentable image, signalling `semaphore` when it is ready.
    pub fn acquire_next(
        &self,
        backend: &mut B,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<AcquireResult> {
        let result = backend.acquire_next_image(self.swapchain, timeout_ns, semaphore)?;
        if let Some(index) = result.image_index() {
            if index as usize >= self.images.len() {
                return Err(GpuError::InvalidState(format!(
                    "Acquired image index {index} out of range for {} images",
                    self.images.len()
                )));
            }
        }
        if !matches!(result, AcquireResult::Ready(_)) {
            tracing::debug!("Acquire on generation {}: {:?}", self.generation, result);
        }
        Ok(result)
    }

    /// Queue `image_index` for presentation once `wait_semaphore` is signalled.
    pub fn present(
        &self,
        backend: &mut B,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<SwapchainStatus> {
        let status = backend.present(self.swapchain, image_index, wait_semaphore)?;
        if status.needs_rebuild() {
            tracing::debug!("Present on generation {}: {:?}", self.generation, status);
        }
        Ok(status)
    }

    /// Raw swapchain handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }

    pub fn image_format(&self) -> vk::Format {
        self.surface_format.format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn images(&self) -> &[PresentableImage<B::DepthImage>] {
        &self.images
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Framebuffer for an acquired image index.
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.images
            .get(image_index as usize)
            .map(|image| image.framebuffer)
    }

    /// Build counter, starting at 1 and carried across rebuilds.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn formats(&self) -> SwapchainFormats {
        SwapchainFormats {
            color: self.surface_format.format,
            depth: self.depth_format,
        }
    }

    /// Snapshot handed to the next generation.
    pub fn info(&self) -> GenerationInfo {
        GenerationInfo {
            generation: self.generation,
            formats: self.formats(),
        }
    }
}
