//! Companion Server - Standalone headless companion bridge.
//!
//! Runs the companion loop against a headless player so controller apps can
//! discover it, push play queues to it and subscribe to its timeline. Useful
//! for server deployments and for exercising controllers without a real player.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use companion_core::{bootstrap_companion, HeadlessPlayer};
use tokio::signal;

use crate::config::ServerConfig;

/// Companion Server - Headless remote playback target.
#[derive(Parser, Debug)]
#[command(name = "companion-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "COMPANION_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "COMPANION_BIND_PORT")]
    port: Option<u16>,

    /// Player name (overrides config file).
    #[arg(short = 'n', long, env = "COMPANION_NAME")]
    name: Option<String>,

    /// Disable mDNS advertisement and discovery.
    #[arg(long)]
    no_mdns: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Companion Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(name) = args.name {
        config.name = Some(name);
    }
    if args.no_mdns {
        config.discovery_mdns = false;
    }
    if config.machine_identifier.is_none() {
        log::warn!("No machine_identifier configured - controllers will see a new player on every start");
    }

    log::info!(
        "Configuration: bind={}:{}, http={}, mdns={}, static_servers={}",
        config.bind_ip,
        config.bind_port,
        config.http_enabled,
        config.discovery_mdns,
        config.static_servers.len()
    );

    let core_config = config.to_core_config();
    let companion = bootstrap_companion(core_config, Arc::new(HeadlessPlayer::new()))
        .context("Failed to bootstrap companion")?;

    let (handle, loop_task) = companion.spawn();
    log::info!("Companion loop started");

    // Wait for shutdown signal
    shutdown_signal().await?;

    log::info!("Shutdown signal received, cleaning up...");

    handle.stop();
    loop_task.await.context("Companion loop task failed")?;

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = signal::ctrl_c() => res.context("Failed to install Ctrl+C handler")?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;

    Ok(())
}
