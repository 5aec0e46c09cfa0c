//! Application framework for swapframe.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate like:
//! - Window creation and management
//! - GPU context and surface initialization
//! - Driving the [`swapframe_render::Renderer`] frame protocol
//! - Event loop handling and frame pacing
//!
//! # Example
//!
//! ```no_run
//! use swapframe_app::{run_app, AppConfig, AppContext, FrameApp, FrameContext};
//!
//! struct MyApp;
//!
//! impl FrameApp for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, _ctx: &mut AppContext, _dt: f32) {}
//!
//!     fn render(&mut self, _ctx: &AppContext, _frame: &FrameContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod frame;
mod runner;
mod surface;

pub use app::FrameApp;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{run_app, AppConfig};
pub use surface::WindowSurface;

// Re-export commonly used types for convenience
pub use swapframe_gpu::{GpuContext, GpuContextBuilder, VulkanBackend};
pub use swapframe_render::{Renderer, RendererConfig};
pub use winit::event::WindowEvent;
