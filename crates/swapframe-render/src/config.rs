//! Renderer configuration.

use swapframe_gpu::{GpuError, Result};

/// Frames the CPU may record ahead of the GPU by default.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Upper bound for [`RendererConfig::frames_in_flight`].
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Configuration for a [`crate::Renderer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererConfig {
    /// Number of frame slots, `1..=MAX_FRAMES_IN_FLIGHT`.
    pub frames_in_flight: usize,
    /// Force FIFO presentation.
    pub vsync: bool,
    /// Colour the swapchain render pass clears to.
    pub clear_color: [f32; 4],
    /// Rebuild after presenting when acquire reported a suboptimal swapchain.
    pub rebuild_on_suboptimal: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            vsync: false,
            clear_color: [0.01, 0.01, 0.01, 1.0],
            rebuild_on_suboptimal: true,
        }
    }
}

impl RendererConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, count: usize) -> Self {
        self.frames_in_flight = count;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Set the render pass clear colour.
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Choose whether a suboptimal acquire schedules a rebuild.
    pub fn with_rebuild_on_suboptimal(mut self, rebuild: bool) -> Self {
        self.rebuild_on_suboptimal = rebuild;
        self
    }

    /// Check the configuration before any GPU object is created.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(GpuError::InvalidState(format!(
                "frames_in_flight must be between 1 and {MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert!(!config.vsync);
        assert!(config.rebuild_on_suboptimal);
        assert_eq!(config.clear_color, [0.01, 0.01, 0.01, 1.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn frames_in_flight_bounds() {
        assert!(RendererConfig::new().with_frames_in_flight(0).validate().is_err());
        assert!(RendererConfig::new().with_frames_in_flight(1).validate().is_ok());
        assert!(RendererConfig::new().with_frames_in_flight(3).validate().is_ok());
        assert!(matches!(
            RendererConfig::new().with_frames_in_flight(4).validate(),
            Err(GpuError::InvalidState(_))
        ));
    }
}
