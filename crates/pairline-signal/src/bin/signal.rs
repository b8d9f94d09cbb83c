//! Pairline Signal Server
//!
//! Rendezvous relay pairing two clients per room and forwarding their
//! session negotiation messages.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (port 8080, or $PORT)
//! pairline-signal
//!
//! # Explicit config file and faster heartbeat
//! pairline-signal --config ./pairline.toml --heartbeat-secs 10
//!
//! # Print a sample config
//! pairline-signal --print-config
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pairline_core::Config;
use pairline_signal::{wait_for_signal, SignalServer};

#[derive(Parser, Debug)]
#[command(name = "pairline-signal")]
#[command(about = "Pairline rendezvous relay for two-party signaling")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Bind address (overrides the config file)
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Config file path (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Heartbeat period in seconds
    #[arg(long)]
    heartbeat_secs: Option<u64>,

    /// HTML file served at `/` instead of the built-in page
    #[arg(long)]
    static_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print a sample config file and exit
    #[arg(long)]
    print_config: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", Config::sample());
        return Ok(());
    }

    init_logging(args.json_logs);

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(port) = args.port {
        config.signal.port = port;
    }
    if let Some(bind) = args.bind {
        config.signal.bind = bind;
    }
    if let Some(secs) = args.heartbeat_secs {
        config.heartbeat.interval_secs = secs;
    }
    if let Some(path) = args.static_file {
        config.signal.static_file = Some(path);
    }
    config.validate()?;

    let addr = config.signal.socket_addr();
    info!("Starting Pairline Signal Server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Heartbeat every {:?}, shutdown grace {:?}",
        config.heartbeat.interval(),
        config.signal.shutdown_grace()
    );

    let server = SignalServer::new(config);
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.serve(addr).await?;

    Ok(())
}
