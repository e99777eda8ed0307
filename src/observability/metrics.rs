//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): time to response head
//! - `gateway_relay_bytes_total` (counter): bytes relayed to clients
//! - `gateway_active_relays` (gauge): streams currently relaying
//! - `gateway_auth_failures_total` (counter): rejections by reason
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! metrics-disabled deployments pay nothing.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Count a request and record the time it took to answer.
pub fn record_request(route: &'static str, status: u16, start: Instant) {
    count_request(route, status);
    histogram!("gateway_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

/// Count a request without timing it.
pub fn count_request(route: &'static str, status: u16) {
    counter!("gateway_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
}

pub fn record_relay_bytes(bytes: u64) {
    counter!("gateway_relay_bytes_total").increment(bytes);
}

pub fn set_active_relays(active: u64) {
    gauge!("gateway_active_relays").set(active as f64);
}

pub fn record_auth_failure(reason: &'static str) {
    counter!("gateway_auth_failures_total", "reason" => reason).increment(1);
}
