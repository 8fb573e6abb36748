//! AVR Sentinel Daemon - Main entry point
//!
//! Discovers receivers, keeps their status current and serves it over
//! REST, WebSocket and the change bus.

mod api;
mod bus;
mod config;
mod server;
mod state;
mod ws;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "avrd")]
#[command(about = "Networked AV receiver discovery and status daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "avrd.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run a single scan and exit
    #[arg(long)]
    scan_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("AVR Sentinel v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;

    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    info!(
        discovery_port = config.discovery.port,
        reconcile = config.reconcile.enabled,
        bus_prefix = %config.bus.topic_prefix,
        "Configuration loaded"
    );

    let state = state::AppState::new(config.clone()).await?;

    if args.scan_once {
        info!("Running single discovery scan");
        let receivers = state.scanner.scan_once().await?;
        println!("Discovered {} receivers:", receivers.len());
        for receiver in receivers {
            println!(
                "  - {} ({}) at {} [{}]",
                receiver.model,
                receiver.identifier,
                receiver.control_address(),
                receiver.region
            );
        }
    } else {
        server::run(state, &config.daemon.bind, config.daemon.tls.as_ref()).await?;
    }

    Ok(())
}
