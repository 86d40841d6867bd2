//! micstream-sink: entry point.
//!
//! ```text
//! micstream-sink                         Receive on the default ports, PCM to stdout
//! micstream-sink --output mic.raw        Save PCM to a file
//! micstream-sink --config <path>         Take ports from a micstream config TOML
//! ```
//!
//! Play the saved stream with `aplay -t raw -f S16_LE -r 16000 -c 1 mic.raw`.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::AsyncWrite;
use tracing::info;
use tracing_subscriber::EnvFilter;

use micstream_core::config::StreamConfig;
use micstream_sink::sink::Sink;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "micstream-sink", about = "Debug receiver for micstream audio and touch")]
struct Cli {
    /// Path to configuration TOML file (ports and log level).
    #[arg(short, long, default_value = "micstream.toml")]
    config: PathBuf,

    /// Address to bind both ports on.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Audio UDP port, overriding the config file.
    #[arg(long)]
    audio_port: Option<u16>,

    /// Touch UDP port, overriding the config file.
    #[arg(long)]
    touch_port: Option<u16>,

    /// Write received PCM here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log counters every N audio datagrams.
    #[arg(long, default_value_t = 200)]
    log_every: u64,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = StreamConfig::load(&cli.config);

    // Init tracing. Logs go to stderr so stdout can carry PCM.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("micstream-sink v{}", env!("CARGO_PKG_VERSION"));

    let audio_port = cli.audio_port.unwrap_or(config.network.audio_port);
    let touch_port = cli.touch_port.unwrap_or(config.network.touch_port);
    let mut sink = Sink::bind(&cli.bind, audio_port, touch_port, cli.log_every).await?;

    let mut out: Box<dyn AsyncWrite + Unpin + Send> = match &cli.output {
        Some(path) => {
            info!("writing PCM to {}", path.display());
            Box::new(tokio::fs::File::create(path).await?)
        }
        None => Box::new(tokio::io::stdout()),
    };

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
    };
    let stats = sink.run(&mut out, shutdown).await?;
    info!(
        "received {} audio packets ({} bytes), {} touch events, {} malformed",
        stats.audio_packets, stats.audio_bytes, stats.touch_events, stats.bad_touch
    );
    Ok(())
}
