//! swapframe demo viewer
//!
//! Opens a window and clears it to an animated colour, driving swapchain
//! acquisition, presentation and recreation through the frame loop.
//! Resize or minimize the window to watch the swapchain being rebuilt.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p swapframe-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--width <N>`: Initial window width (default: 1280)
//! - `--height <N>`: Initial window height (default: 720)
//! - `--vsync`: Present with FIFO instead of preferring MAILBOX
//! - `--frames-in-flight <N>`: Frames recorded ahead of the GPU, 1 to 3 (default: 2)
//! - `--validation`: Enable Vulkan validation layers (on by default in debug builds)
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use anyhow::{bail, Context};
use swapframe_app::{run_app, AppConfig};

use crate::app::Viewer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

/// Parsed command line options.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ViewerArgs {
    width: u32,
    height: u32,
    vsync: bool,
    frames_in_flight: usize,
    validation: bool,
    help: bool,
}

impl Default for ViewerArgs {
    fn default() -> Self {
        Self {
            width: WIDTH,
            height: HEIGHT,
            vsync: false,
            frames_in_flight: 2,
            validation: cfg!(debug_assertions),
            help: false,
        }
    }
}

impl ViewerArgs {
    /// Parse arguments, not including the program name.
    fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => parsed.help = true,
                "--vsync" => parsed.vsync = true,
                "--validation" => parsed.validation = true,
                "--width" => parsed.width = parse_value(&arg, args.next())?,
                "--height" => parsed.height = parse_value(&arg, args.next())?,
                "--frames-in-flight" => parsed.frames_in_flight = parse_value(&arg, args.next())?,
                other => bail!("Unknown option '{other}' (see --help)"),
            }
        }

        if parsed.width == 0 || parsed.height == 0 {
            bail!("Window size must be non-zero");
        }

        Ok(parsed)
    }

    fn app_config(&self) -> AppConfig {
        AppConfig::new("swapframe viewer")
            .with_size(self.width, self.height)
            .with_vsync(self.vsync)
            .with_frames_in_flight(self.frames_in_flight)
            .with_validation(self.validation)
    }
}

fn parse_value<T>(flag: &str, value: Option<String>) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = value.with_context(|| format!("{flag} needs a value"))?;
    value
        .parse()
        .with_context(|| format!("Invalid value '{value}' for {flag}"))
}

fn main() -> anyhow::Result<()> {
    let args = ViewerArgs::parse(std::env::args().skip(1))?;
    if args.help {
        print_help();
        return Ok(());
    }

    run_app::<Viewer>(args.app_config())
}

fn print_help() {
    eprintln!(
        "swapframe demo viewer

USAGE:
    cargo run -p swapframe-viewer -- [OPTIONS]

OPTIONS:
    --width <N>             Initial window width (default: {WIDTH})
    --height <N>            Initial window height (default: {HEIGHT})
    --vsync                 Present with FIFO instead of preferring MAILBOX
    --frames-in-flight <N>  Frames recorded ahead of the GPU, 1 to 3 (default: 2)
    --validation            Enable Vulkan validation layers
                            (always on in debug builds)
    -h, --help              Print this help message

EXAMPLES:
    # Default window
    cargo run -p swapframe-viewer

    # Small window, vsync, triple buffering
    cargo run -p swapframe-viewer -- --width 640 --height 480 --vsync --frames-in-flight 3

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
