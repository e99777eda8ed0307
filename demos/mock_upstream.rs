//! Pretend inference service for local runs.
//!
//! Serves `POST /v1/chat/stream`, answering with a handful of SSE token
//! events spaced 200 ms apart so incremental delivery through the gateway
//! is visible.
//!
//! ```text
//! cargo run --example mock_upstream
//! LLM_PROXY_URL=http://127.0.0.1:9000 AUTH_ENABLED=false cargo run
//! cargo run --bin gateway-cli -- stream demo-session --timings
//! ```

use axum::{
    body::Body,
    http::{header, HeaderMap},
    response::Response,
    routing::post,
    Router,
};
use bytes::Bytes;
use futures_util::stream;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

const TOKENS: &[&str] = &["Hello", " from", " the", " pretend", " model", "!"];

async fn chat_stream(headers: HeaderMap, body: Bytes) -> Response {
    println!(
        "upstream: request_id={:?} authorization={} body={} bytes",
        headers.get("x-request-id"),
        headers.contains_key(header::AUTHORIZATION),
        body.len()
    );

    let events = stream::unfold(0usize, |i| async move {
        if i > TOKENS.len() {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        let event = match TOKENS.get(i) {
            Some(token) => format!("event: token\ndata: {{\"index\":{i},\"text\":\"{token}\"}}\n\n"),
            None => "event: done\ndata: {}\n\n".to_string(),
        };
        Some((Ok::<_, Infallible>(Bytes::from(event)), i + 1))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(events))
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let app = Router::new().route("/v1/chat/stream", post(chat_stream));

    let addr = SocketAddr::from(([127, 0, 0, 1], 9000));
    println!("Pretend inference service is listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
