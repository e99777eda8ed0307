//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization header
//!     → bearer.rs (shape check, token extraction)
//!     → validator.rs (TokenVerifier: remote introspection)
//!     → claims.rs (Claims attached to the request)
//!     → middleware.rs (401 on any failure)
//! ```
//!
//! # Design Decisions
//! - Malformed headers never reach the verifier
//! - Header and verification failures look identical to the client (401)
//!   and distinct in logs and metrics
//! - The verifier owns its client and is closed once at shutdown

pub mod bearer;
pub mod claims;
pub mod middleware;
pub mod validator;

pub use bearer::{extract_bearer, BearerError};
pub use claims::Claims;
pub use middleware::{require_auth, SharedVerifier};
pub use validator::{IntrospectionValidator, TokenVerifier, VerificationError};
