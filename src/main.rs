//! Orchestrator streaming gateway.
//!
//! Authenticated front door for chat streams: verifies the caller's bearer
//! token, then relays the upstream inference service's Server-Sent Events
//! to the client chunk by chunk.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                   GATEWAY                    │
//!                        │                                              │
//!     Client Request     │  ┌────────┐   ┌──────────┐   ┌───────────┐  │
//!     ───────────────────┼─▶│  http  │──▶│   auth   │──▶│   relay   │──┼──▶ Upstream
//!                        │  │ server │   │ verifier │   │ upstream  │  │    /v1/chat/stream
//!                        │  └────────┘   └──────────┘   └─────┬─────┘  │
//!                        │                                    │        │
//!     SSE chunks         │  ┌──────────────────────────────┐  │        │
//!     ◀──────────────────┼──│ relay stream (≤16 KiB/chunk) │◀─┘        │
//!                        │  └──────────────────────────────┘           │
//!                        │                                              │
//!                        │  config · observability · lifecycle          │
//!                        └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use orchestrator_gateway::config::load_config;
use orchestrator_gateway::lifecycle::{self, Shutdown};
use orchestrator_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "orchestrator-gateway")]
#[command(about = "Authenticated SSE streaming gateway", long_about = None)]
struct Cli {
    /// TOML configuration file. Environment variables override it.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    logging::init(&config.observability, config.listener.is_production())?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.listener.environment,
        port = config.listener.port,
        auth_enabled = config.auth.enabled,
        upstream_configured = config.upstream.base_url().is_some(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let started = lifecycle::start(config).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    lifecycle::spawn_signal_handler(shutdown);

    started.server.run(started.listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
