//! Upstream inference service client.
//!
//! # Responsibilities
//! - Hold the resolved streaming target (`<base>/v1/chat/stream`)
//! - Build the single upstream request for an inbound stream
//! - Classify dial failures (transport vs. non-200)

use axum::body::Body;
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{Instrument, Span};

use crate::config::UpstreamConfig;
use crate::http::error::GatewayError;
use crate::http::request::X_REQUEST_ID;

/// Fixed streaming path on the upstream service.
pub const UPSTREAM_STREAM_PATH: &str = "/v1/chat/stream";

/// Header deadline used until [`UpstreamClient::with_header_timeout`] is set.
pub const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(30);

/// SSE media type.
pub const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Error)]
pub enum UpstreamSetupError {
    #[error("invalid upstream url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },

    #[error("upstream token is not a valid header value")]
    InvalidToken,
}

/// Client for the upstream streaming endpoint.
///
/// Clones share one connection pool.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
    target: Option<Uri>,
    authorization: Option<HeaderValue>,
    header_timeout: Duration,
    span: Span,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamSetupError> {
        let target = config
            .base_url()
            .map(|base| {
                let url = format!("{}{}", base.trim_end_matches('/'), UPSTREAM_STREAM_PATH);
                url.parse::<Uri>()
                    .map_err(|source| UpstreamSetupError::InvalidUrl { url, source })
            })
            .transpose()?;

        let authorization = config
            .token()
            .map(|token| {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| UpstreamSetupError::InvalidToken)?;
                value.set_sensitive(true);
                Ok(value)
            })
            .transpose()?;

        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            target,
            authorization,
            header_timeout: DEFAULT_HEADER_TIMEOUT,
            span: Span::none(),
        })
    }

    /// Fail a dial with [`GatewayError::UpstreamTimeout`] when upstream
    /// response headers take longer than `timeout`. The streamed body is not
    /// bounded by it.
    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// Log upstream activity under `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The resolved streaming target, if an upstream is configured.
    pub fn target(&self) -> Option<&Uri> {
        self.target.as_ref()
    }

    /// Open the upstream stream for an inbound request.
    ///
    /// `inbound` supplies the headers that travel upstream (content type and
    /// request id); `body` is forwarded as-is without buffering. Returns the
    /// upstream response only when it answered 200.
    pub async fn open(
        &self,
        inbound: &HeaderMap,
        body: Body,
    ) -> Result<Response<Incoming>, GatewayError> {
        let target = self.target.clone().ok_or(GatewayError::Misconfigured)?;
        let request = self.build_request(target, inbound, body)?;

        let pending = tokio::time::timeout(self.header_timeout, self.client.request(request));
        let response = match pending.instrument(self.span.clone()).await {
            Ok(result) => result.map_err(GatewayError::UpstreamUnreachable)?,
            Err(_) => return Err(GatewayError::UpstreamTimeout(self.header_timeout)),
        };

        let status = response.status();
        self.span
            .in_scope(|| tracing::debug!(status = status.as_u16(), "Upstream responded"));
        if status != StatusCode::OK {
            return Err(GatewayError::UpstreamError(status));
        }
        Ok(response)
    }

    fn build_request(
        &self,
        target: Uri,
        inbound: &HeaderMap,
        body: Body,
    ) -> Result<Request<Body>, GatewayError> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(target)
            .header(ACCEPT, EVENT_STREAM);

        if let Some(content_type) = inbound.get(CONTENT_TYPE) {
            builder = builder.header(CONTENT_TYPE, content_type.clone());
        }
        if let Some(authorization) = &self.authorization {
            builder = builder.header(AUTHORIZATION, authorization.clone());
        }
        if let Some(request_id) = inbound.get(X_REQUEST_ID) {
            builder = builder.header(X_REQUEST_ID, request_id.clone());
        }

        builder
            .body(body)
            .map_err(|e| GatewayError::UpstreamRequest(e.to_string()))
    }
}
