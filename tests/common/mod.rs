//! Shared utilities for gateway integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use orchestrator_gateway::auth::{Claims, SharedVerifier, TokenVerifier, VerificationError};
use orchestrator_gateway::relay::RelayTracker;
use orchestrator_gateway::{AuthMode, GatewayConfig, GatewayServer, Shutdown};

pub const GOOD_TOKEN: &str = "good-token";

/// Serve `app` on an ephemeral loopback port, standing in for the
/// inference service.
pub async fn spawn_upstream(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// An address nothing is listening on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Gateway config pointed at `upstream` (or none).
pub fn gateway_config(upstream: Option<SocketAddr>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_host = "127.0.0.1".into();
    config.upstream.base_url = upstream.map(|addr| format!("http://{addr}"));
    config.timeouts.shutdown_grace_secs = 1;
    config
}

/// A running gateway.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub tracker: RelayTracker,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn stream_url(&self, session_id: &str) -> String {
        self.url(&format!(
            "/orchestrator/v1/sessions/{session_id}/messages/stream"
        ))
    }
}

pub async fn spawn_gateway(config: GatewayConfig, auth: AuthMode) -> TestGateway {
    let server = GatewayServer::with_auth(config, auth).unwrap();
    let tracker = server.tracker();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let handle = tokio::spawn(server.run(listener, receiver));

    TestGateway {
        addr,
        shutdown,
        tracker,
        handle,
    }
}

/// Accepts exactly [`GOOD_TOKEN`] and counts every call.
#[derive(Default)]
pub struct StaticVerifier {
    pub verifications: AtomicUsize,
    pub closes: AtomicUsize,
}

impl StaticVerifier {
    pub fn shared() -> (Arc<Self>, AuthMode) {
        let verifier = Arc::new(Self::default());
        let shared: SharedVerifier = verifier.clone();
        (verifier, AuthMode::Enabled(shared))
    }

    pub fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, VerificationError> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        if token == GOOD_TOKEN {
            Ok(Claims::new("user-42", "ada"))
        } else {
            Err(VerificationError::Inactive)
        }
    }

    async fn close(&self) -> Result<(), VerificationError> {
        if self.closes.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(())
        } else {
            Err(VerificationError::AlreadyClosed)
        }
    }
}

/// HTTP client that never reuses connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    true
}
