// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use magnifier::constants::app_info;
use magnifier::errors::AppResult;
use magnifier::{CameraSource, Config};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "magnifier")]
#[command(about = "Use a camera as a live magnifying glass")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Overrides for the configured camera source
///
/// When several are given, `--device` wins over `--image`, which wins over
/// `--test-pattern`.
#[derive(Args)]
struct SourceArgs {
    /// V4L2 device node to use (e.g. /dev/video0)
    #[arg(long, global = true)]
    device: Option<String>,

    /// Show a still image instead of a camera
    #[arg(long, global = true)]
    image: Option<PathBuf>,

    /// Show a generated test pattern instead of a camera
    #[arg(long, global = true)]
    test_pattern: bool,
}

impl SourceArgs {
    fn apply(self, config: &mut Config) {
        if let Some(device) = self.device {
            config.source = CameraSource::V4l2 {
                device: Some(device),
            };
        } else if let Some(path) = self.image {
            config.source = CameraSource::Image { path };
        } else if self.test_pattern {
            config.source = CameraSource::TestPattern;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the magnifier in the terminal (default)
    Terminal,

    /// List available cameras
    List,

    /// Capture a single frame and save it
    Snapshot {
        /// Zoom ratio to apply before capturing
        #[arg(short, long)]
        zoom: Option<f32>,

        /// Switch the torch on before capturing
        #[arg(short, long)]
        torch: bool,

        /// Output file (default: ~/Pictures/magnifier/MAG_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();
    let terminal_mode = matches!(cli.command, None | Some(Commands::Terminal));

    // RUST_LOG controls the level, e.g. RUST_LOG=magnifier=debug
    init_logging(terminal_mode);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    cli.source.apply(&mut config);

    match cli.command {
        None | Some(Commands::Terminal) => cli::run_terminal(&config),
        Some(Commands::List) => cli::list_cameras(&config),
        Some(Commands::Snapshot {
            zoom,
            torch,
            output,
        }) => cli::take_snapshot(&config, zoom, torch, output),
    }
}

/// Log to stderr, or to a file while the terminal UI owns the screen
fn init_logging(terminal_mode: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let log_file = terminal_mode
        .then(|| {
            let dir = dirs::state_dir()
                .or_else(dirs::cache_dir)?
                .join(app_info::APP_NAME);
            std::fs::create_dir_all(&dir).ok()?;
            std::fs::File::create(dir.join(format!("{}.log", app_info::APP_NAME))).ok()
        })
        .flatten();

    match log_file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init(),
        None if terminal_mode => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init(),
    }
}
