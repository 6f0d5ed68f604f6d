//! partty Daemon
//!
//! Listens for viewers over TCP and gives each connected terminal its own
//! animation session.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (0.0.0.0:2222, 15 fps, bundled frames)
//! partty-daemon
//!
//! # Custom port and frame rate
//! partty-daemon --port 3000 --fps 24
//!
//! # Own frames and config file
//! partty-daemon --frames-dir ./frames --config /etc/partty/partty.toml
//!
//! # Verbose logging
//! RUST_LOG=debug partty-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use partty_core::{
    load_catalog, load_config, load_required_config, ConfigOverrides, PartyConfig,
    SessionRuntime,
};

use server::{DaemonServer, ServerConfig};

/// partty daemon - a party parrot for every terminal that connects
#[derive(Parser, Debug)]
#[command(name = "partty-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(short = 'b', long, value_name = "ADDR")]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Animation frames per second
    #[arg(long, value_name = "FPS")]
    fps: Option<u32>,

    /// Directory of *.txt frames to use instead of the bundled parrot
    #[arg(long, value_name = "DIR")]
    frames_dir: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "PARTTY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seed for reproducible color sequences
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Maximum simultaneous connections
    #[arg(long, value_name = "N")]
    max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "PARTTY_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind: self.bind.clone(),
            port: self.port,
            fps: self.fps,
            frames_dir: self.frames_dir.clone(),
            seed: self.seed,
            max_connections: self.max_connections,
        }
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("partty_daemon={level},partty_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

/// File, then environment, then command line
fn resolve_config(args: &Args) -> Result<PartyConfig> {
    let mut config = match args.config {
        Some(ref path) => load_required_config(path),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Load the catalogs and build the session runtime
async fn build_runtime(config: &PartyConfig) -> Result<SessionRuntime> {
    let catalog = load_catalog(config.frames_dir.as_deref())
        .await
        .context("Failed to load frames")?;
    let palette = config.palette().context("Invalid palette")?;
    let runtime_config = config.runtime_config()?;

    SessionRuntime::new(Arc::new(catalog), Arc::new(palette), runtime_config)
        .context("Failed to create session runtime")
}

/// Resolves on SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for SIGINT");
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Received SIGINT, initiating shutdown"),
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
                sigterm.recv().await;
                info!("Received SIGTERM, initiating shutdown");
            }
        },
    }
}

/// Resolves on Ctrl-C
#[cfg(not(unix))]
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, initiating shutdown"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("partty daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args)?;
    info!(
        source = %config.source(),
        file = ?config.config_file_path,
        listen = %config.listen_addr(),
        fps = config.fps,
        max_connections = config.max_connections,
        "Configuration resolved"
    );

    let runtime = build_runtime(&config).await?;
    info!(
        frames = runtime.catalog().len(),
        colors = runtime.palette().len(),
        tick_ms = u64::try_from(runtime.config().tick_period.as_millis()).unwrap_or(u64::MAX),
        "Session runtime ready"
    );

    let server =
        DaemonServer::bind(&config.listen_addr(), runtime, ServerConfig::from(&config)).await?;

    match server.run(shutdown_signal()).await {
        Ok(()) => {
            info!("partty daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}
