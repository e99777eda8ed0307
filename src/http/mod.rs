//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, graceful shutdown)
//!     → request.rs (request ID, per-request span)
//!     → cors.rs (preflight, origin policy)
//!     → health.rs                  GET|* /orchestrator/v1/healthz
//!     → stream.rs (capability → auth → relay)
//!                                  POST /orchestrator/v1/sessions/{id}/messages/stream
//!     → error.rs (GatewayError → status + text body)
//! ```

pub mod cors;
pub mod error;
pub mod health;
pub mod request;
pub mod server;
pub mod stream;

pub use error::GatewayError;
pub use request::X_REQUEST_ID;
pub use server::{AuthMode, GatewayServer, ServerError, HEALTH_PATH, STREAM_PATH};
