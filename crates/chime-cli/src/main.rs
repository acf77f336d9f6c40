//! # Chime
//!
//! Plays sound files concurrently through one sound system, reporting the
//! progress of every channel until they finish, are stopped, or Ctrl-C closes
//! the system.

mod app;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use app::{App, RunOptions};
use chime_audio::output::{default_device_name, list_output_devices};
use chime_core::SoundConfig;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "chime", version, about = "Play sounds concurrently")]
struct Cli {
    /// Sound files to play, relative to the resource root.
    #[arg(required_unless_present = "list_devices")]
    files: Vec<String>,

    /// Directory resource paths are resolved against.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Configuration file (defaults to the platform config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Play without an output device.
    #[arg(long)]
    silent: bool,

    /// Stop every channel after this many milliseconds.
    #[arg(long, value_name = "MS")]
    stop_after: Option<u64>,

    /// How often progress is reported, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 250)]
    progress_interval: u64,

    /// List output devices and exit.
    #[arg(long)]
    list_devices: bool,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            stop_after: self.stop_after.map(Duration::from_millis),
            progress_interval: Duration::from_millis(self.progress_interval.max(10)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chime=info,chime_audio=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        let default = default_device_name();
        for device in list_output_devices().context("Failed to list output devices")? {
            let marker = if Some(&device) == default.as_ref() { "*" } else { " " };
            println!("{marker} {device}");
        }
        return Ok(());
    }

    info!("Starting Chime v{}", env!("CARGO_PKG_VERSION"));

    let mut config = SoundConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(root) = &cli.root {
        config.resource_root.clone_from(root);
    }

    let mut app = App::new(config);
    app.start(cli.silent)
        .await
        .context("Failed to start the sound system")?;

    let result = app.run(&cli.files, cli.run_options()).await;
    app.teardown();
    result
}
