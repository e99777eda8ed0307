//! End-to-end relay behaviour: incremental delivery, binary fidelity,
//! client disconnect and graceful shutdown.

use axum::{body::Body, http::header, response::Response, routing::post, Router};
use bytes::Bytes;
use futures_util::stream;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use orchestrator_gateway::AuthMode;

mod common;
use common::{StaticVerifier, GOOD_TOKEN};

fn sse_response(body: Body) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(body)
        .unwrap()
}

/// Flags when the upstream's response stream is dropped, which happens
/// once the gateway stops reading it.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Upstream that sends a heartbeat every 20 ms until the connection goes away.
fn endless_upstream(dropped: Arc<AtomicBool>) -> Router {
    Router::new().route(
        "/v1/chat/stream",
        post(move || {
            let flag = DropFlag(dropped.clone());
            async move {
                let beats = stream::unfold(flag, |flag| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Some((Ok::<_, Infallible>(Bytes::from_static(b": ping\n\n")), flag))
                });
                sse_response(Body::from_stream(beats))
            }
        }),
    )
}

/// Upstream emitting `data: event-<i>` every `gap`, logging each emission.
fn staggered_upstream(events: usize, gap: Duration, emitted: Arc<Mutex<Vec<Instant>>>) -> Router {
    Router::new().route(
        "/v1/chat/stream",
        post(move || {
            let log = emitted.clone();
            async move {
                let body = stream::unfold(0usize, move |i| {
                    let log = log.clone();
                    async move {
                        if i == events {
                            return None;
                        }
                        tokio::time::sleep(gap).await;
                        log.lock().unwrap().push(Instant::now());
                        let event = format!("data: event-{i}\n\n");
                        Some((Ok::<_, Infallible>(Bytes::from(event)), i + 1))
                    }
                });
                sse_response(Body::from_stream(body))
            }
        }),
    )
}

/// Record, for each event, when its full text had been received.
fn mark_arrivals(received: &str, arrivals: &mut [Option<Instant>], now: Instant) {
    for (i, arrival) in arrivals.iter_mut().enumerate() {
        if arrival.is_none() && received.contains(&format!("data: event-{i}\n\n")) {
            *arrival = Some(now);
        }
    }
}

fn assert_not_held_back(arrivals: &[Option<Instant>], emitted: &[Instant]) {
    assert_eq!(emitted.len(), arrivals.len());
    for i in 0..arrivals.len() - 1 {
        let arrival = arrivals[i].expect("event never arrived");
        assert!(
            arrival < emitted[i + 1],
            "event {i} was held back until event {} was emitted",
            i + 1
        );
    }
}

#[tokio::test]
async fn test_events_arrive_before_the_next_is_emitted() {
    const EVENTS: usize = 5;
    let emitted: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let app = staggered_upstream(EVENTS, Duration::from_millis(150), emitted.clone());
    let upstream = common::spawn_upstream(app).await;
    let (_verifier, auth) = StaticVerifier::shared();
    let gateway = common::spawn_gateway(common::gateway_config(Some(upstream)), auth).await;

    let mut res = common::client()
        .post(gateway.stream_url("s1"))
        .bearer_auth(GOOD_TOKEN)
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let mut received = String::new();
    let mut arrivals: Vec<Option<Instant>> = vec![None; EVENTS];
    while let Some(chunk) = res.chunk().await.unwrap() {
        let now = Instant::now();
        received.push_str(std::str::from_utf8(&chunk).unwrap());
        mark_arrivals(&received, &mut arrivals, now);
    }

    let expected: String = (0..EVENTS).map(|i| format!("data: event-{i}\n\n")).collect();
    assert_eq!(received, expected);

    assert_not_held_back(&arrivals, &emitted.lock().unwrap());

    assert!(common::eventually(Duration::from_secs(2), || gateway.tracker.active_count() == 0).await);
    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_http10_client_receives_staggered_events() {
    const EVENTS: usize = 3;
    let emitted: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let app = staggered_upstream(EVENTS, Duration::from_millis(300), emitted.clone());
    let upstream = common::spawn_upstream(app).await;
    let (_verifier, auth) = StaticVerifier::shared();
    let gateway = common::spawn_gateway(common::gateway_config(Some(upstream)), auth).await;

    let mut socket = TcpStream::connect(gateway.addr).await.unwrap();
    socket
        .write_all(
            b"POST /orchestrator/v1/sessions/s1/messages/stream HTTP/1.0\r\n\
              Host: localhost\r\n\
              Authorization: Bearer good-token\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .await
        .unwrap();

    // The body is close-delimited, so read until the gateway hangs up.
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let mut arrivals: Vec<Option<Instant>> = vec![None; EVENTS];
    loop {
        let n = tokio::time::timeout(Duration::from_secs(5), socket.read(&mut buf))
            .await
            .expect("gateway stalled")
            .unwrap();
        if n == 0 {
            break;
        }
        let now = Instant::now();
        raw.extend_from_slice(&buf[..n]);
        mark_arrivals(&String::from_utf8_lossy(&raw), &mut arrivals, now);
    }

    let response = String::from_utf8_lossy(&raw);
    assert!(response.starts_with("HTTP/1."), "{response}");
    assert!(response.lines().next().unwrap().contains(" 200 "), "{response}");
    assert!(response.to_ascii_lowercase().contains("content-type: text/event-stream"));
    assert!(response.ends_with("data: event-2\n\n"), "{response}");
    assert_not_held_back(&arrivals, &emitted.lock().unwrap());

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_large_binary_payload_is_relayed_unchanged() {
    let payload: Vec<u8> = (0..100_000u32).map(|i| (i * 31 % 256) as u8).collect();
    let served = Bytes::from(payload.clone());
    let app = Router::new().route(
        "/v1/chat/stream",
        post(move || {
            let served = served.clone();
            async move { sse_response(Body::from(served)) }
        }),
    );
    let upstream = common::spawn_upstream(app).await;
    let gateway = common::spawn_gateway(common::gateway_config(Some(upstream)), AuthMode::Disabled).await;

    let mut res = common::client()
        .post(gateway.stream_url("s1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let mut received = Vec::new();
    while let Some(chunk) = res.chunk().await.unwrap() {
        assert!(chunk.len() <= 16 * 1024, "chunk of {} bytes", chunk.len());
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, payload);

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_client_disconnect_releases_upstream() {
    let dropped = Arc::new(AtomicBool::new(false));
    let upstream = common::spawn_upstream(endless_upstream(dropped.clone())).await;
    let gateway = common::spawn_gateway(common::gateway_config(Some(upstream)), AuthMode::Disabled).await;

    let client = common::client();
    let mut res = client
        .post(gateway.stream_url("s1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.chunk().await.unwrap().is_some());
    assert_eq!(gateway.tracker.active_count(), 1);

    drop(res);
    drop(client);

    assert!(
        common::eventually(Duration::from_secs(5), || gateway.tracker.active_count() == 0).await,
        "relay still active after client left"
    );
    assert!(
        common::eventually(Duration::from_secs(5), || dropped.load(Ordering::SeqCst)).await,
        "upstream stream still being read after client left"
    );

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_abandons_streams_after_grace_and_closes_verifier() {
    let dropped = Arc::new(AtomicBool::new(false));
    let upstream = common::spawn_upstream(endless_upstream(dropped)).await;
    let (verifier, auth) = StaticVerifier::shared();
    let gateway = common::spawn_gateway(common::gateway_config(Some(upstream)), auth).await;

    let mut res = common::client()
        .post(gateway.stream_url("s1"))
        .bearer_auth(GOOD_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.chunk().await.unwrap().is_some());

    gateway.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), gateway.handle)
        .await
        .expect("server did not stop within the grace period");
    assert!(result.unwrap().is_ok());
    assert_eq!(verifier.closes(), 1);
}

#[tokio::test]
async fn test_idle_shutdown_closes_verifier_once() {
    let (verifier, auth) = StaticVerifier::shared();
    let gateway = common::spawn_gateway(common::gateway_config(None), auth).await;

    gateway.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), gateway.handle)
        .await
        .expect("server did not stop");
    assert!(result.unwrap().is_ok());
    assert_eq!(verifier.closes(), 1);
    assert_eq!(verifier.verifications(), 0);
}
