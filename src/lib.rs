//! Orchestrator streaming gateway library.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod relay;

pub use config::GatewayConfig;
pub use http::{AuthMode, GatewayServer};
pub use lifecycle::Shutdown;
