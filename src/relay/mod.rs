//! Streaming relay subsystem.
//!
//! # Data Flow
//! ```text
//! authorized inbound request
//!     → upstream.rs (one POST to <base>/v1/chat/stream, body streamed)
//!     → 200? else 502
//!     → stream.rs (upstream frames → ≤16 KiB chunks, in order)
//!     → response body, flushed whenever upstream goes quiet
//! ```
//!
//! # Phases
//! ```text
//! Received → Authorized → UpstreamDialing → Streaming → Closed
//!     error exits: AuthRejected, Misconfigured, UpstreamUnreachable,
//!                  UpstreamError, StreamingUnsupported
//! ```
//!
//! # Design Decisions
//! - At most one upstream connection per inbound request, never retried
//! - Bytes are opaque; no SSE parsing or reframing
//! - Cancellation is drop: a vanished client drops the relay stream, which
//!   drops the upstream body and its connection

pub mod stream;
pub mod tracker;
pub mod upstream;

use std::fmt;

use crate::http::error::GatewayError;

pub use stream::{relay_stream, MAX_CHUNK};
pub use tracker::{RelayEnd, RelayGuard, RelayId, RelayTracker};
pub use upstream::{UpstreamClient, UpstreamSetupError, EVENT_STREAM, UPSTREAM_STREAM_PATH};

/// Lifecycle phases of a streaming request, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Received,
    Authorized,
    UpstreamDialing,
    Streaming,
    Closed,
    AuthRejected,
    Misconfigured,
    UpstreamUnreachable,
    UpstreamError,
    StreamingUnsupported,
}

impl RelayPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayPhase::Received => "received",
            RelayPhase::Authorized => "authorized",
            RelayPhase::UpstreamDialing => "upstream_dialing",
            RelayPhase::Streaming => "streaming",
            RelayPhase::Closed => "closed",
            RelayPhase::AuthRejected => "auth_rejected",
            RelayPhase::Misconfigured => "misconfigured",
            RelayPhase::UpstreamUnreachable => "upstream_unreachable",
            RelayPhase::UpstreamError => "upstream_error",
            RelayPhase::StreamingUnsupported => "streaming_unsupported",
        }
    }

    /// True for phases that end the request.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RelayPhase::Received
                | RelayPhase::Authorized
                | RelayPhase::UpstreamDialing
                | RelayPhase::Streaming
        )
    }
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&GatewayError> for RelayPhase {
    fn from(error: &GatewayError) -> Self {
        match error {
            GatewayError::Unauthorized => RelayPhase::AuthRejected,
            GatewayError::Misconfigured => RelayPhase::Misconfigured,
            GatewayError::UpstreamUnreachable(_) | GatewayError::UpstreamTimeout(_) => {
                RelayPhase::UpstreamUnreachable
            }
            GatewayError::UpstreamError(_) => RelayPhase::UpstreamError,
            // A request that could not be built never left the gateway.
            GatewayError::UpstreamRequest(_) => RelayPhase::UpstreamUnreachable,
            GatewayError::StreamingUnsupported => RelayPhase::StreamingUnsupported,
        }
    }
}
