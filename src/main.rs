//! RPC bridge.
//!
//! Exposes backend RPC services over plain HTTP and WebSocket.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────┐
//!                          │                      BRIDGE                      │
//!     HTTP / WebSocket     │  ┌─────────┐    ┌──────────┐    ┌─────────────┐  │
//!     ─────────────────────┼─▶│  http   │───▶│ routing  │───▶│   bridge    │  │
//!                          │  │ server  │    │ registry │    │unary/stream │  │
//!                          │  └─────────┘    └──────────┘    └──────┬──────┘  │
//!                          │       ▲                                │         │
//!                          │       │         ┌──────────┐    ┌──────▼──────┐  │
//!     Response / frames    │  ┌────┴────┐    │ payload  │    │  transport  │  │      Backend
//!     ◀────────────────────┼──│response │    │ + codec  │    │ + selector  │◀─┼───── services
//!                          │  └─────────┘    └──────────┘    └─────────────┘  │
//!                          │                                                  │
//!                          │   config · lifecycle · observability · net       │
//!                          └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use rpc_bridge::config::{load_config, watcher::ConfigWatcher, BridgeConfig};
use rpc_bridge::http::HttpServer;
use rpc_bridge::lifecycle::{signals::shutdown_signal, Shutdown};
use rpc_bridge::observability::{logging, metrics};
use rpc_bridge::payload::pool;
use rpc_bridge::transport::HttpTransport;

#[derive(Parser)]
#[command(name = "rpc-bridge")]
#[command(about = "HTTP and WebSocket bridge to backend RPC services", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);

    if cli.check {
        tracing::info!(services = config.services.len(), "Configuration is valid");
        return Ok(());
    }

    tracing::info!("rpc-bridge v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        max_recv_size = config.limits.max_recv_size,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    pool::init(config.buffer_pool.capacity, config.buffer_pool.buffer_size);

    // Keep the watcher alive for the lifetime of the server.
    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(updates), Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    let transport = HttpTransport::new(
        Duration::from_secs(config.timeouts.connect_secs),
        config.limits.max_response_size,
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, Arc::new(transport));
    let server_task = tokio::spawn(server.run(listener, config_updates, server_shutdown));

    shutdown_signal().await;
    shutdown.trigger();

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
