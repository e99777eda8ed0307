//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the health and streaming routes
//! - Attach authentication to the streaming route only
//! - Wire up middleware (tracing, request ID, CORS)
//! - Serve until shutdown, then close the token verifier once

use axum::{
    middleware,
    routing::{any, post},
    Router,
};
use std::future::IntoFuture;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, Span};

use crate::auth::{require_auth, IntrospectionValidator, SharedVerifier, VerificationError};
use crate::config::GatewayConfig;
use crate::http::cors::cors_layer;
use crate::http::health::healthz;
use crate::http::request::{request_span, MakeGatewayRequestId};
use crate::http::stream::{require_streaming, stream_messages, StreamState};
use crate::relay::{RelayTracker, UpstreamClient, UpstreamSetupError};

/// Liveness route.
pub const HEALTH_PATH: &str = "/orchestrator/v1/healthz";

/// Protected streaming route.
pub const STREAM_PATH: &str = "/orchestrator/v1/sessions/{sessionId}/messages/stream";

/// Whether protected routes require a bearer token.
#[derive(Clone)]
pub enum AuthMode {
    /// Protected routes run unauthenticated.
    Disabled,
    /// Protected routes require a token accepted by the verifier.
    Enabled(SharedVerifier),
}

/// Error type for server construction.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("token verifier: {0}")]
    Verifier(#[from] VerificationError),

    #[error("upstream: {0}")]
    Upstream(#[from] UpstreamSetupError),
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    auth: AuthMode,
    tracker: RelayTracker,
    span: Span,
}

impl GatewayServer {
    /// Create a server, building the token verifier from configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let auth = if config.auth.enabled {
            let verifier: SharedVerifier = Arc::new(IntrospectionValidator::new(&config.auth)?);
            AuthMode::Enabled(verifier)
        } else {
            tracing::warn!("Authentication disabled: protected routes run unauthenticated");
            AuthMode::Disabled
        };
        Self::with_auth(config, auth)
    }

    /// Create a server with an explicit authentication mode.
    pub fn with_auth(config: GatewayConfig, auth: AuthMode) -> Result<Self, ServerError> {
        let span = tracing::info_span!("gateway", component = "server");
        let upstream = UpstreamClient::new(&config.upstream)?
            .with_header_timeout(config.timeouts.request())
            .with_span(tracing::info_span!(parent: &span, "upstream", component = "upstream"));
        span.in_scope(|| match upstream.target() {
            Some(target) => tracing::info!(upstream = %target, "Upstream configured"),
            None => tracing::warn!("Upstream not configured: streaming requests will get 503"),
        });

        let tracker = RelayTracker::with_span(tracing::info_span!(
            parent: &span,
            "relay",
            component = "relay"
        ));
        let state = StreamState {
            upstream,
            tracker: tracker.clone(),
        };

        let router = Self::build_router(&config, &auth, state);
        Ok(Self {
            router,
            config,
            auth,
            tracker,
            span,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, auth: &AuthMode, state: StreamState) -> Router {
        let mut stream_route = post(stream_messages);
        if let AuthMode::Enabled(verifier) = auth {
            stream_route =
                stream_route.route_layer(middleware::from_fn_with_state(verifier.clone(), require_auth));
        }
        stream_route = stream_route.route_layer(middleware::from_fn(require_streaming));

        Router::new()
            .route(HEALTH_PATH, any(healthz))
            .route(STREAM_PATH, stream_route)
            .with_state(state)
            .layer(cors_layer(&config.cors))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(SetRequestIdLayer::x_request_id(MakeGatewayRequestId))
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Tracker of relays currently streaming.
    pub fn tracker(&self) -> RelayTracker {
        self.tracker.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    ///
    /// After the signal, in-flight streams get `shutdown_grace_secs` to
    /// finish. The token verifier is closed exactly once on the way out,
    /// whether or not streams are still running.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let span = self.span.clone();
        self.serve_until(listener, shutdown).instrument(span).await
    }

    async fn serve_until(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = %self.config.listener.environment,
            "HTTP server starting"
        );

        let (draining_tx, mut draining_rx) = watch::channel(false);
        let serve = axum::serve(listener, self.router.clone()).with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received, draining streams");
            let _ = draining_tx.send(true);
        });

        let grace = self.config.timeouts.shutdown_grace();
        let result = tokio::select! {
            result = serve.into_future() => result,
            _ = async {
                if draining_rx.wait_for(|draining| *draining).await.is_ok() {
                    tokio::time::sleep(grace).await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {
                tracing::warn!(
                    active_relays = self.tracker.active_count(),
                    grace_secs = grace.as_secs(),
                    "Grace period elapsed, abandoning in-flight streams"
                );
                Ok(())
            }
        };

        self.close().await;
        tracing::info!("HTTP server stopped");
        result
    }

    async fn close(&self) {
        if let AuthMode::Enabled(verifier) = &self.auth {
            if let Err(e) = verifier.close().await {
                tracing::error!(error = %e, "Failed to close token verifier");
            }
        }
    }
}
