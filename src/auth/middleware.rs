//! Bearer authentication middleware for protected routes.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::auth::bearer::extract_bearer;
use crate::auth::validator::TokenVerifier;
use crate::http::error::GatewayError;
use crate::observability::metrics;

/// Verifier shared by every protected request.
pub type SharedVerifier = Arc<dyn TokenVerifier>;

/// Reject the request with 401 unless it carries a token the verifier
/// accepts. On success the [`Claims`](crate::auth::Claims) are attached to
/// the request for the handler.
pub async fn require_auth(
    State(verifier): State<SharedVerifier>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(request.headers()) {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(reason = e.reason(), error = %e, "Rejected malformed authorization");
            metrics::record_auth_failure(e.reason());
            return GatewayError::Unauthorized.into_response();
        }
    };

    let outcome = verifier.verify(token).await;
    match outcome {
        Ok(claims) => {
            tracing::debug!(subject = %claims.subject, "Token verified");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(reason = e.reason(), error = %e, "Token verification failed");
            metrics::record_auth_failure(e.reason());
            GatewayError::Unauthorized.into_response()
        }
    }
}
