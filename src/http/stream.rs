//! Streaming endpoint: `POST /orchestrator/v1/sessions/{sessionId}/messages/stream`.
//!
//! # Responsibilities
//! - Refuse HTTP/0.9, which cannot carry the event-stream response
//! - Open the upstream stream for an authorized request
//! - Answer with SSE headers and the relayed body
//!
//! # Design Decisions
//! - Claims come from the request itself (set by the auth middleware), never
//!   from shared state
//! - Every failure ends the request; nothing is retried

use axum::{
    body::Body,
    extract::{Path, State},
    http::{
        header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
        HeaderValue, Request, StatusCode, Version,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;

use crate::auth::Claims;
use crate::http::error::GatewayError;
use crate::http::request::request_id_of;
use crate::observability::metrics;
use crate::relay::{relay_stream, RelayPhase, RelayTracker, UpstreamClient, EVENT_STREAM};

/// State for the streaming handler.
#[derive(Clone)]
pub struct StreamState {
    pub upstream: UpstreamClient,
    pub tracker: RelayTracker,
}

/// Whether a connection speaking `version` can deliver a streamed body
/// chunk by chunk. HTTP/1.0 gets a close-delimited body that is still
/// flushed per chunk; HTTP/0.9 has no status line or headers to carry the
/// event-stream response.
pub fn supports_incremental_flush(version: Version) -> bool {
    version != Version::HTTP_09
}

/// Outermost check on the streaming route, ahead of authentication.
pub async fn require_streaming(request: Request<Body>, next: Next) -> Response {
    if !supports_incremental_flush(request.version()) {
        tracing::warn!(
            request_id = %request_id_of(&request),
            version = ?request.version(),
            phase = %RelayPhase::StreamingUnsupported,
            "Connection cannot stream"
        );
        metrics::count_request("stream", StatusCode::INTERNAL_SERVER_ERROR.as_u16());
        return GatewayError::StreamingUnsupported.into_response();
    }
    next.run(request).await
}

/// Relay a chat stream from upstream to the client.
pub async fn stream_messages(
    State(state): State<StreamState>,
    Path(session_id): Path<String>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let request_id = request_id_of(&request).to_string();

    match open_relay(&state, &session_id, &request_id, request).await {
        Ok(response) => {
            metrics::record_request("stream", StatusCode::OK.as_u16(), start);
            response
        }
        Err(e) => {
            let phase = RelayPhase::from(&e);
            match &e {
                GatewayError::UpstreamUnreachable(source) => tracing::error!(
                    request_id = %request_id,
                    session_id = %session_id,
                    phase = %phase,
                    error = %source,
                    "Upstream request failed"
                ),
                _ => tracing::warn!(
                    request_id = %request_id,
                    session_id = %session_id,
                    phase = %phase,
                    error = %e,
                    "Stream rejected"
                ),
            }
            metrics::record_request("stream", e.status().as_u16(), start);
            e.into_response()
        }
    }
}

async fn open_relay(
    state: &StreamState,
    session_id: &str,
    request_id: &str,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    match request.extensions().get::<Claims>() {
        Some(claims) => tracing::info!(
            request_id = %request_id,
            session_id = %session_id,
            subject = %claims.subject,
            username = %claims.username,
            phase = %RelayPhase::Authorized,
            "Starting SSE stream"
        ),
        None => tracing::info!(
            request_id = %request_id,
            session_id = %session_id,
            phase = %RelayPhase::Authorized,
            "Starting SSE stream without authentication"
        ),
    }

    let target = state.upstream.target().ok_or(GatewayError::Misconfigured)?;
    tracing::debug!(
        request_id = %request_id,
        upstream = %target,
        phase = %RelayPhase::UpstreamDialing,
        "Dialing upstream"
    );

    let version = request.version();
    let (parts, body) = request.into_parts();
    let upstream = state.upstream.open(&parts.headers, body).await?;

    let guard = state.tracker.track(session_id);
    tracing::debug!(
        request_id = %request_id,
        relay_id = %guard.id(),
        phase = %RelayPhase::Streaming,
        "Upstream accepted, streaming"
    );

    let body = Body::from_stream(relay_stream(upstream.into_body(), guard));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    // HTTP/1.0 bodies here are close-delimited; HTTP/2 forbids the header.
    if version == Version::HTTP_11 {
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    }
    Ok(response)
}
