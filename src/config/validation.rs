//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port and deadline non-zero, URLs parse)
//! - Reject auth enabled without a verification backend
//! - Check CORS values are valid header values
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - A missing upstream URL is valid (degraded mode, 503 per request)

use axum::http::{HeaderName, HeaderValue, Method};
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.port must be non-zero")]
    ZeroPort,

    #[error("timeouts.request_secs must be non-zero")]
    ZeroRequestTimeout,

    #[error("upstream.base_url '{url}' is invalid: {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },

    #[error("auth is enabled but auth.introspection_url is not set")]
    MissingAuthBackend,

    #[error("auth.introspection_url '{url}' is invalid: {reason}")]
    InvalidAuthUrl { url: String, reason: String },

    #[error("cors.{field} contains invalid value '{value}'")]
    InvalidCorsValue { field: &'static str, value: String },
}

/// Validate a loaded configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if let Some(base) = config.upstream.base_url() {
        if let Err(reason) = check_upstream_url(base) {
            errors.push(ValidationError::InvalidUpstreamUrl {
                url: base.to_string(),
                reason,
            });
        }
    }

    if config.auth.enabled {
        match config.auth.introspection_url() {
            None => errors.push(ValidationError::MissingAuthBackend),
            Some(url) => {
                if let Err(e) = Url::parse(url) {
                    errors.push(ValidationError::InvalidAuthUrl {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    validate_cors(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// The relay dials upstream over plain HTTP/1.1 or h2c.
fn check_upstream_url(base: &str) -> Result<(), String> {
    let url = Url::parse(base).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}', expected http", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err("query and fragment are not allowed".to_string());
    }
    Ok(())
}

fn validate_cors(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let cors = &config.cors;

    for origin in &cors.allowed_origins {
        let origin = origin.trim();
        if origin != "*" && HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError::InvalidCorsValue {
                field: "allowed_origins",
                value: origin.to_string(),
            });
        }
    }
    for method in &cors.allowed_methods {
        if Method::from_bytes(method.trim().as_bytes()).is_err() {
            errors.push(ValidationError::InvalidCorsValue {
                field: "allowed_methods",
                value: method.clone(),
            });
        }
    }
    for (field, names) in [
        ("allowed_headers", &cors.allowed_headers),
        ("exposed_headers", &cors.exposed_headers),
    ] {
        for name in names {
            if HeaderName::from_bytes(name.trim().as_bytes()).is_err() {
                errors.push(ValidationError::InvalidCorsValue {
                    field,
                    value: name.clone(),
                });
            }
        }
    }
}
