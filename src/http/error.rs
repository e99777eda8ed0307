//! Request-terminal errors and their HTTP mapping.
//!
//! | Error | Status |
//! |---|---|
//! | `Unauthorized` | 401 |
//! | `StreamingUnsupported` | 500 |
//! | `UpstreamUnreachable`, `UpstreamTimeout`, `UpstreamError` | 502 |
//! | `Misconfigured` | 503 |

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("upstream not configured")]
    Misconfigured,

    #[error("upstream unavailable")]
    UpstreamUnreachable(#[source] hyper_util::client::legacy::Error),

    /// No response headers from upstream within the deadline.
    #[error("upstream timed out")]
    UpstreamTimeout(std::time::Duration),

    /// Upstream answered with something other than 200.
    #[error("upstream error: {0}")]
    UpstreamError(StatusCode),

    #[error("failed to build upstream request: {0}")]
    UpstreamRequest(String),

    #[error("streaming unsupported")]
    StreamingUnsupported,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::Misconfigured => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamUnreachable(_)
            | GatewayError::UpstreamTimeout(_)
            | GatewayError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamRequest(_) | GatewayError::StreamingUnsupported => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = match &self {
            // Keep builder details out of client-facing bodies.
            GatewayError::UpstreamRequest(_) => "failed to build upstream request".to_string(),
            other => other.to_string(),
        };
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}
