//! Token verification against a remote identity backend.
//!
//! # Responsibilities
//! - Verify an opaque bearer token, returning [`Claims`]
//! - Own the HTTP client used to reach the identity backend
//! - Release that client exactly once on shutdown
//!
//! # Design Decisions
//! - Verification uses OAuth 2.0 token introspection (RFC 7662)
//! - The client sits in an `ArcSwapOption`: verifications load it without
//!   locking, `close` swaps it out once
//! - No caching and no retries; every failure is final for the request

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

use crate::auth::claims::Claims;
use crate::config::AuthConfig;

/// Why a token was not accepted by the verifier.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("token is not active")]
    Inactive,

    #[error("identity backend returned status {0}")]
    Status(u16),

    #[error("identity backend unreachable: {0}")]
    Transport(String),

    #[error("identity backend response malformed: {0}")]
    Malformed(String),

    #[error("verifier is closed")]
    Closed,

    #[error("verifier was already closed")]
    AlreadyClosed,

    #[error("verifier setup failed: {0}")]
    Setup(String),
}

impl VerificationError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            VerificationError::Inactive => "inactive",
            VerificationError::Status(_) => "backend_status",
            VerificationError::Transport(_) => "backend_unreachable",
            VerificationError::Malformed(_) => "backend_malformed",
            VerificationError::Closed | VerificationError::AlreadyClosed => "closed",
            VerificationError::Setup(_) => "setup",
        }
    }
}

/// Verifies bearer tokens.
///
/// Implementations must tolerate many concurrent `verify` calls.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Claims, VerificationError>;

    /// Release the verifier's resources. Called once at shutdown.
    async fn close(&self) -> Result<(), VerificationError>;
}

/// RFC 7662 introspection response. Only `active` is mandatory.
#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl IntrospectionResponse {
    fn into_claims(self) -> Result<Claims, VerificationError> {
        if !self.active {
            return Err(VerificationError::Inactive);
        }
        let subject = self
            .sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| VerificationError::Malformed("active token without sub".into()))?;
        let username = self
            .preferred_username
            .or(self.username)
            .unwrap_or_default();

        Ok(Claims {
            subject,
            username,
            attributes: self.extra,
        })
    }
}

/// Verifier backed by an introspection endpoint.
pub struct IntrospectionValidator {
    endpoint: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    client: ArcSwapOption<reqwest::Client>,
    span: tracing::Span,
}

impl IntrospectionValidator {
    /// Build the validator and its HTTP client.
    pub fn new(config: &AuthConfig) -> Result<Self, VerificationError> {
        let endpoint = config
            .introspection_url()
            .ok_or_else(|| VerificationError::Setup("introspection_url is not set".into()))?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| VerificationError::Setup(e.to_string()))?;

        let span = tracing::info_span!("auth_validator", component = "auth", endpoint = %endpoint);
        span.in_scope(|| tracing::info!("Token verifier ready"));

        Ok(Self {
            endpoint,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            client: ArcSwapOption::from(Some(Arc::new(client))),
            span,
        })
    }

    async fn introspect(
        &self,
        client: &reqwest::Client,
        token: &str,
    ) -> Result<Claims, VerificationError> {
        let mut request = client
            .post(&self.endpoint)
            .form(&[("token", token), ("token_type_hint", "access_token")]);
        if let Some(id) = &self.client_id {
            request = request.basic_auth(id, self.client_secret.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| VerificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerificationError::Status(status.as_u16()));
        }

        let body: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| VerificationError::Malformed(e.to_string()))?;
        body.into_claims()
    }
}

#[async_trait]
impl TokenVerifier for IntrospectionValidator {
    async fn verify(&self, token: &str) -> Result<Claims, VerificationError> {
        let client = self.client.load_full().ok_or(VerificationError::Closed)?;
        self.introspect(&client, token)
            .instrument(self.span.clone())
            .await
    }

    async fn close(&self) -> Result<(), VerificationError> {
        self.span.in_scope(|| match self.client.swap(None) {
            Some(client) => {
                // In-flight verifications keep their own Arc until they finish.
                tracing::info!(
                    in_flight = Arc::strong_count(&client) - 1,
                    "Token verifier closed"
                );
                Ok(())
            }
            None => Err(VerificationError::AlreadyClosed),
        })
    }
}
