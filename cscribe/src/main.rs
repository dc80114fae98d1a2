//! cscribe - looping audio player for transcribing music by ear
//!
//! Plays one file in an endless loop while the console seeks, marks and
//! adjusts the displayed tempo.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use cscribe::audio::sink::{AudioSink, CpalSink, DeviceOptions, StreamSpec};
use cscribe::console::ConsoleApp;
use cscribe::playback::health::RealtimeHealth;
use cscribe::playback::session::{Session, SinkOpener};
use cscribe_common::config::{LoggingConfig, TomlConfig};
use cscribe_common::events::EventBus;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Event bus capacity per subscriber
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for cscribe
#[derive(Parser, Debug)]
#[command(name = "cscribe")]
#[command(about = "Looping audio player for transcribing music")]
#[command(version)]
struct Args {
    /// Audio file to open on startup
    file: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, env = "CSCRIBE_CONFIG")]
    config: Option<PathBuf>,

    /// Output device name (overrides config)
    #[arg(short, long, env = "CSCRIBE_DEVICE")]
    device: Option<String>,

    /// Output buffer size in frames (overrides config)
    #[arg(long)]
    buffer_size: Option<u32>,

    /// Log level filter when RUST_LOG is unset (overrides config)
    #[arg(long)]
    log_level: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The logging section lives in the config file, so config loads first
    // and reports how it resolved once the subscriber is installed
    let (config, config_source) =
        TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    init_logging(&config.logging, args.log_level.as_deref())?;

    info!("Starting cscribe v{}", env!("CARGO_PKG_VERSION"));
    config_source.report();

    if args.list_devices {
        let devices = CpalSink::list_devices().context("Failed to enumerate audio devices")?;
        for name in devices {
            println!("{}", name);
        }
        return Ok(());
    }

    let options = DeviceOptions {
        device: args.device.or(config.audio.device.clone()),
        buffer_size: args.buffer_size.or(config.audio.buffer_size),
    };
    let open_sink: SinkOpener = Box::new(move |spec: &StreamSpec, health: Arc<RealtimeHealth>| {
        CpalSink::open(spec, &options, health).map(|sink| Box::new(sink) as Box<dyn AudioSink>)
    });

    let bus = EventBus::new(EVENT_BUS_CAPACITY);
    let session = Session::new(bus, open_sink);
    let app = ConsoleApp::new(session, config.controls.clone());

    if let Err(e) = app.run(args.file).await {
        error!("Fatal: {}", e);
        return Err(e).context("Audio output failed");
    }

    info!("cscribe exited cleanly");
    Ok(())
}

/// Logs go to stderr or the configured file; stdout belongs to the console.
fn init_logging(logging: &LoggingConfig, cli_level: Option<&str>) -> Result<()> {
    let default_level = cli_level.unwrap_or(&logging.level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("cscribe={0},cscribe_common={0}", default_level)))
        .context("Invalid log level")?;

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}
