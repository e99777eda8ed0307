//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: '{value}'")]
    Env { key: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: defaults, then the optional TOML file, then process
/// environment overrides. The result is validated.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// [`load_config`] with an explicit environment lookup.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => load_file(path)?,
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML file without validating it.
pub fn load_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Apply environment-style overrides. Empty values are ignored.
///
/// | Variable | Field |
/// |---|---|
/// | `APP_PORT` | `listener.port` |
/// | `APP_ENV` | `listener.environment` |
/// | `ALLOWED_ORIGINS` | `cors.allowed_origins` (comma separated) |
/// | `LLM_PROXY_URL` | `upstream.base_url` |
/// | `LLM_PROXY_TOKEN` | `upstream.token` |
/// | `AUTH_ENABLED` | `auth.enabled` |
/// | `AUTH_INTROSPECTION_URL` | `auth.introspection_url` |
/// | `AUTH_CLIENT_ID` | `auth.client_id` |
/// | `AUTH_CLIENT_SECRET` | `auth.client_secret` |
/// | `LOG_LEVEL` | `observability.log_level` |
/// | `LOG_FORMAT` | `observability.log_format` |
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(port) = get("APP_PORT") {
        config.listener.port = port.trim().parse().map_err(|_| ConfigError::Env {
            key: "APP_PORT",
            value: port.clone(),
        })?;
    }
    if let Some(env) = get("APP_ENV") {
        config.listener.environment = env;
    }
    if let Some(origins) = get("ALLOWED_ORIGINS") {
        config.cors.allowed_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(url) = get("LLM_PROXY_URL") {
        config.upstream.base_url = Some(url);
    }
    if let Some(token) = get("LLM_PROXY_TOKEN") {
        config.upstream.token = Some(token);
    }
    if let Some(enabled) = get("AUTH_ENABLED") {
        config.auth.enabled = parse_bool(&enabled).ok_or(ConfigError::Env {
            key: "AUTH_ENABLED",
            value: enabled.clone(),
        })?;
    }
    if let Some(url) = get("AUTH_INTROSPECTION_URL") {
        config.auth.introspection_url = Some(url);
    }
    if let Some(id) = get("AUTH_CLIENT_ID") {
        config.auth.client_id = Some(id);
    }
    if let Some(secret) = get("AUTH_CLIENT_SECRET") {
        config.auth.client_secret = Some(secret);
    }
    if let Some(level) = get("LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(format) = get("LOG_FORMAT") {
        config.observability.log_format = Some(match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" | "text" => LogFormat::Pretty,
            _ => {
                return Err(ConfigError::Env {
                    key: "LOG_FORMAT",
                    value: format,
                })
            }
        });
    }

    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
