//! API Gateway
//!
//! Front door for the backend services, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                           ┌──────────────────────────────────────────────────────┐
//!                           │                     API GATEWAY                       │
//!                           │                                                       │
//!     Client Request        │  ┌──────────┐   ┌────────────┐   ┌──────────────┐    │
//!     ──────────────────────┼─▶│  http    │──▶│ rate limit │──▶│   routing    │    │
//!                           │  │  server  │   │ (security) │   │   table      │    │
//!                           │  └──────────┘   └─────┬──────┘   └──────┬───────┘    │
//!                           │                       │ 429             │            │
//!                           │                       ▼                 ▼            │
//!                           │                                  ┌──────────────┐    │
//!                           │                                  │  dispatcher  │    │
//!                           │                                  │ + breaker    │    │
//!                           │                                  │  registry    │    │
//!                           │                                  └──────┬───────┘    │
//!                           │                                         │ 503 / 502  │
//!     Client Response       │  ┌──────────┐                    ┌──────▼───────┐    │
//!     ◀─────────────────────┼──│ response │◀───────────────────│ http client  │◀───┼──── Backend
//!                           │  └──────────┘                    └──────────────┘    │     Service
//!                           │                                                       │
//!                           │   config · observability · lifecycle · admin          │
//!                           └──────────────────────────────────────────────────────┘
//! ```

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::{load_config, GatewayConfig};
use api_gateway::lifecycle::{signals, Shutdown};
use api_gateway::observability::{logging, metrics};
use api_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "api-gateway")]
#[command(about = "API gateway with rate limiting and circuit breaking", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!("api-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        routes = config.routes.len(),
        rate_limit_enabled = config.rate_limit.enabled,
        max_failures = config.circuit_breaker.max_failures,
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

    // Bind TCP listener
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    signals::wait_for_signal(&shutdown).await;
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
