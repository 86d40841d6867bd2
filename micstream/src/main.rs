//! micstream: entry point.
//!
//! ```text
//! micstream stream                      Stream until Ctrl-C or the session ends
//! micstream tap X Y                     Send one tap
//! micstream swipe X1 Y1 X2 Y2           Send one swipe
//! micstream action home|back|scroll-up|scroll-down
//! micstream console [--with-audio]      Read commands from stdin
//! micstream --config <path>             Load a custom config TOML
//! micstream --gen-config                Write default config to stdout
//! micstream --native stream             Record via cpal (feature `cpal`)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Notify, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use micstream::console::{HELP, parse_line};
use micstream::surface::{ControlSurface, Flow};
use micstream_core::config::StreamConfig;
use micstream_core::{
    CaptureSource, CommandCapture, FileCapture, RemoteAction, StatusEvent, StatusSource,
    StdinCapture, status_channel,
};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "micstream", about = "Microphone and touch streaming to a car head unit")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "micstream.toml")]
    config: PathBuf,

    /// Head-unit host, overriding the config file.
    #[arg(long, global = true)]
    host: Option<String>,

    /// Audio UDP port, overriding the config file.
    #[arg(long, global = true)]
    audio_port: Option<u16>,

    /// Touch UDP port, overriding the config file.
    #[arg(long, global = true)]
    touch_port: Option<u16>,

    /// Use the default route instead of pinning to the configured interface.
    #[arg(long, global = true)]
    no_pin: bool,

    /// Record from the audio host directly instead of the recorder command
    /// (needs the `cpal` feature).
    #[arg(long, global = true)]
    native: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Stream the microphone until Ctrl-C or the session ends.
    Stream {
        /// Raw s16le PCM file to send instead of recording ("-" for stdin).
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Tap at a remote pixel.
    Tap { x: i16, y: i16 },
    /// Swipe between two remote pixels.
    Swipe {
        x1: i16,
        y1: i16,
        x2: i16,
        y2: i16,
        /// Intermediate moves (defaults to touch.swipe_steps).
        #[arg(long)]
        steps: Option<u16>,
    },
    /// Press a shortcut button: home, back, scroll-up, scroll-down.
    Action { action: RemoteAction },
    /// Interactive command console on stdin.
    Console {
        /// Start the microphone stream alongside.
        #[arg(long)]
        with_audio: bool,
        /// Raw s16le PCM file to send instead of recording ("-" for stdin).
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&StreamConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then apply command-line overrides.
    let mut config = StreamConfig::load(&cli.config);
    if let Some(host) = &cli.host {
        config.network.host = host.clone();
    }
    if let Some(port) = cli.audio_port {
        config.network.audio_port = port;
    }
    if let Some(port) = cli.touch_port {
        config.network.touch_port = port;
    }
    if cli.no_pin {
        config.network.pin_interface = false;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("micstream v{}", env!("CARGO_PKG_VERSION"));
    info!("head unit: {}", config.network.host);
    info!(
        "audio port: {}, touch port: {}",
        config.network.audio_port, config.network.touch_port
    );
    match config.network.binder().target() {
        Some(class) => info!("interface: {class}"),
        None => info!("interface: default route"),
    }

    let mode = cli.mode.unwrap_or(Mode::Console {
        with_audio: false,
        input: None,
    });

    let input = match &mode {
        Mode::Stream { input } | Mode::Console { input, .. } => input.clone(),
        _ => None,
    };
    let capture = capture_source(&config, input.as_ref(), cli.native)?;
    info!("capture: {}", capture.describe());

    let (status, status_rx) = status_channel(StatusSource::Audio);
    let audio_ended = Arc::new(Notify::new());
    let printer = tokio::spawn(print_status(status_rx, Arc::clone(&audio_ended)));
    let swipe_steps = config.touch.swipe_steps;
    let mut surface = ControlSurface::new(config, capture, status);

    match mode {
        Mode::Stream { .. } => {
            surface.start_audio()?;
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, stopping"),
                _ = audio_ended.notified() => info!("audio session ended, exiting"),
            }
        }
        Mode::Tap { x, y } => surface.touch().tap(x, y)?,
        Mode::Swipe {
            x1,
            y1,
            x2,
            y2,
            steps,
        } => surface
            .touch()
            .swipe(x1, y1, x2, y2, steps.unwrap_or(swipe_steps))?,
        Mode::Action { action } => action.perform(surface.touch(), swipe_steps)?,
        Mode::Console { with_audio, .. } => {
            if with_audio {
                surface.start_audio()?;
            }
            run_console(&mut surface).await?;
        }
    }

    surface.shutdown().await;
    // A detached audio worker may still hold a reporter.
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    Ok(())
}

/// Pick the capture source: `--input` wins over `--native`, which wins
/// over the configured recorder.
fn capture_source(
    config: &StreamConfig,
    input: Option<&PathBuf>,
    native: bool,
) -> Result<Arc<dyn CaptureSource>, Box<dyn std::error::Error>> {
    let source: Arc<dyn CaptureSource> = match input {
        Some(path) if path.as_os_str() == "-" => Arc::new(StdinCapture),
        Some(path) => Arc::new(FileCapture::new(path)),
        None if native => native_capture()?,
        None => Arc::new(CommandCapture::from_argv(&config.audio.capture_command)?),
    };
    Ok(source)
}

#[cfg(feature = "cpal")]
fn native_capture() -> Result<Arc<dyn CaptureSource>, Box<dyn std::error::Error>> {
    Ok(Arc::new(micstream_core::CpalCapture::new()))
}

#[cfg(not(feature = "cpal"))]
fn native_capture() -> Result<Arc<dyn CaptureSource>, Box<dyn std::error::Error>> {
    Err("--native needs a build with the cpal feature".into())
}

/// Log status events; wake `audio_ended` whenever an audio session ends.
async fn print_status(mut rx: mpsc::Receiver<StatusEvent>, audio_ended: Arc<Notify>) {
    while let Some(event) = rx.recv().await {
        if event.connected {
            info!("{event}");
        } else {
            warn!("{event}");
        }
        if event.ends_audio_session() {
            audio_ended.notify_one();
        }
    }
}

/// Read console commands from stdin until `quit`, EOF or Ctrl-C.
async fn run_console(surface: &mut ControlSurface) -> Result<(), Box<dyn std::error::Error>> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, leaving console");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let cmd = match parse_line(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match surface.execute(cmd).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => error!("command failed: {e}"),
        }
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
