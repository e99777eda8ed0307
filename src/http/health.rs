//! Liveness endpoint.

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::observability::metrics;

/// Fixed liveness payload.
pub const HEALTH_BODY: &str = r#"{"status":"ok"}"#;

/// Always `200 {"status":"ok"}`. Touches neither auth nor upstream.
pub async fn healthz() -> impl IntoResponse {
    metrics::count_request("healthz", StatusCode::OK.as_u16());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        HEALTH_BODY,
    )
}
