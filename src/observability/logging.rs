//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` wins over the configured level
//! - Installed once from `main`; components log through spans they are
//!   handed at construction

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Resolve the output format: explicit setting, else JSON in production.
pub fn resolve_format(config: &ObservabilityConfig, production: bool) -> LogFormat {
    config.log_format.unwrap_or(if production {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    })
}

/// Filter directive for a bare level such as `info`; full directives pass
/// through untouched.
pub fn filter_directive(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("orchestrator_gateway={level},tower_http={level},warn")
    }
}

/// Install the global subscriber.
pub fn init(
    config: &ObservabilityConfig,
    production: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(&config.log_level)))?;

    let json = resolve_format(config, production) == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_current_span(true)))
        .with((!json).then(fmt::layer))
        .try_init()?;

    Ok(())
}
