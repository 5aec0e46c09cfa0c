//! The window side of the frame loop.

use ash::vk;

/// A window surface as seen by the [`crate::Renderer`].
///
/// The windowing layer records resizes as a flag; the renderer polls it once
/// per frame instead of being called back.
pub trait PresentationSurface {
    /// Current drawable size in pixels. Zero in either dimension while minimized.
    fn drawable_extent(&self) -> vk::Extent2D;

    /// Return whether the surface was resized since the last call, clearing the flag.
    fn take_resized(&mut self) -> bool;

    /// Block until window events arrive.
    ///
    /// Returns `false` when the surface cannot block (for example, when the
    /// event loop drives the renderer). The renderer then defers the rebuild
    /// and retries on the next frame.
    fn wait_events(&mut self) -> bool;
}

/// Whether an extent can back a swapchain.
pub(crate) fn is_drawable(extent: vk::Extent2D) -> bool {
    extent.width > 0 && extent.height > 0
}
