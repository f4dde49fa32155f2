//! # meshcastd - Meshcast coordinator fan-out daemon
//!
//! Propagates node, peer, and proxy configuration from the coordinator to
//! mesh agents over pub/sub, and periodically forces a full resync.
//!
//! ## Architecture
//! ```text
//! topology change / restart / timer tick
//!                  ↓
//!   Propagator (peers / update / proxy / metrics)
//!                  ↓
//!   MessageQueue (bounded ack wait) → Redis PUBLISH → agents
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod maintenance;
mod publishers;
mod queue;
mod registry;
mod routes;
mod scheduler;
mod startup;
mod state;
mod topics;
mod transport;

#[cfg(test)]
mod testing;

use crate::config::{AppConfig, TransportBackend};
use crate::queue::broadcast_worker;
use crate::scheduler::scheduler_worker;
use crate::state::AppState;

/// Meshcast coordinator daemon
#[derive(Parser, Debug)]
#[command(name = "meshcastd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/meshcastd.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Admin listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Publish backend (overrides config)
    #[arg(long, value_enum, env = "MESHCAST_TRANSPORT")]
    transport: Option<TransportBackend>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs)?;

    info!("🕸️ Starting meshcastd v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!(server_id = %config.server_id, "📋 Configuration loaded from {}", args.config);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let (state, broadcast_rx) = AppState::new(config.clone()).await?;
    info!(transport = ?config.transport, "✅ Redis connected: {}", config.redis_url);

    // Background network broadcasts
    tokio::spawn(broadcast_worker(
        state.propagator.clone(),
        broadcast_rx,
        shutdown_tx.subscribe(),
    ));

    // Agents re-pull everything after a coordinator restart
    if let Err(e) = startup::server_start_notify(&state.propagator).await {
        tracing::error!(error = %e, "Startup notification failed");
    }

    tokio::spawn(scheduler_worker(
        state.scheduler.clone(),
        Duration::from_secs(config.scheduler.tick_interval_secs),
        shutdown_tx.subscribe(),
    ));

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 meshcastd listening on {}", config.listen_addr);

    let shutdown_signal = {
        let shutdown = shutdown_tx.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            info!("🛑 Shutdown signal received");
            let _ = shutdown.send(());
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("👋 meshcastd shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to install JSON log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    Ok(())
}
