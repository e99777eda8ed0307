//! Active relay tracking.
//!
//! # Responsibilities
//! - Count relays that are currently streaming
//! - Give each relay a unique id for log correlation
//! - Log how each relay ended (upstream EOF, upstream error, client gone)

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Span;

use crate::observability::metrics;
use crate::relay::RelayPhase;

/// Unique identifier for a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelayId(u64);

impl RelayId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "relay-{}", self.0)
    }
}

/// How a relay stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// Upstream signalled end-of-stream.
    UpstreamEof,
    /// Reading from upstream failed.
    UpstreamReadError(String),
}

/// Counts live relays. Cheap to clone; clones share the counter.
#[derive(Debug, Clone)]
pub struct RelayTracker {
    active: Arc<AtomicU64>,
    next_id: Arc<AtomicU64>,
    span: Span,
}

impl RelayTracker {
    pub fn new() -> Self {
        Self::with_span(Span::none())
    }

    /// Tracker whose relays log their outcome under `span`.
    pub fn with_span(span: Span) -> Self {
        Self {
            active: Arc::new(AtomicU64::new(0)),
            next_id: Arc::new(AtomicU64::new(0)),
            span,
        }
    }

    /// Register a new relay. The returned guard decrements the count on drop.
    pub fn track(&self, session_id: impl Into<String>) -> RelayGuard {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_relays(active);

        RelayGuard {
            active: Arc::clone(&self.active),
            id: RelayId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1),
            session_id: session_id.into(),
            started: Instant::now(),
            chunks: 0,
            bytes: 0,
            end: None,
            span: self.span.clone(),
        }
    }

    /// Number of relays currently streaming.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until no relay is active, up to `timeout`. Returns true if idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.active_count() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

impl Default for RelayTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard held by a single relay for its whole lifetime.
#[derive(Debug)]
pub struct RelayGuard {
    active: Arc<AtomicU64>,
    id: RelayId,
    session_id: String,
    started: Instant,
    chunks: u64,
    bytes: u64,
    end: Option<RelayEnd>,
    span: Span,
}

impl RelayGuard {
    pub fn id(&self) -> RelayId {
        self.id
    }

    /// Account for one chunk handed to the client.
    pub fn record_chunk(&mut self, len: usize) {
        self.chunks += 1;
        self.bytes += len as u64;
        metrics::record_relay_bytes(len as u64);
    }

    /// Mark how the upstream side finished.
    pub fn finish(&mut self, end: RelayEnd) {
        self.end = Some(end);
    }
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_active_relays(remaining);

        let _entered = self.span.enter();
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match &self.end {
            Some(RelayEnd::UpstreamEof) => tracing::info!(
                relay_id = %self.id,
                session_id = %self.session_id,
                phase = %RelayPhase::Closed,
                chunks = self.chunks,
                bytes = self.bytes,
                elapsed_ms,
                "Relay completed"
            ),
            Some(RelayEnd::UpstreamReadError(error)) => tracing::warn!(
                relay_id = %self.id,
                session_id = %self.session_id,
                phase = %RelayPhase::Closed,
                chunks = self.chunks,
                bytes = self.bytes,
                elapsed_ms,
                error = %error,
                "Relay stopped on upstream read error"
            ),
            // Dropped mid-stream: the server gave up on the client connection.
            None => tracing::info!(
                relay_id = %self.id,
                session_id = %self.session_id,
                phase = %RelayPhase::Closed,
                chunks = self.chunks,
                bytes = self.bytes,
                elapsed_ms,
                "Client went away, relay aborted"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_ids_are_unique() {
        let tracker = RelayTracker::new();
        let a = tracker.track("s");
        let b = tracker.track("s");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn tracker_counts_guards() {
        let tracker = RelayTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track("s1");
        let mut guard2 = tracker.clone().track("s2");
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        guard2.record_chunk(10);
        guard2.finish(RelayEnd::UpstreamEof);
        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_times_out_while_busy() {
        let tracker = RelayTracker::new();
        let guard = tracker.track("s");
        assert!(!tracker.wait_idle(Duration::from_millis(30)).await);
        drop(guard);
        assert!(tracker.wait_idle(Duration::from_millis(30)).await);
    }
}
