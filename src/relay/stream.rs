//! Byte-transparent relay of an upstream body.
//!
//! The relay is a pull-based stream. hyper's connection dispatcher keeps
//! polling it while chunks are ready, buffering them, and flushes the
//! buffer to the socket as soon as the stream returns `Pending`. An upstream
//! event is therefore written out while the relay waits for the next one.
//! Dropping the stream (client gone) drops the upstream body with it, which
//! closes the upstream connection.

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use http_body_util::BodyExt;
use hyper::body::Body as HttpBody;
use std::convert::Infallible;
use std::fmt::Display;

use crate::relay::tracker::{RelayEnd, RelayGuard};

/// Largest chunk handed to the client in one write.
pub const MAX_CHUNK: usize = 16 * 1024;

struct RelayState<B> {
    body: B,
    pending: Bytes,
    guard: RelayGuard,
}

/// Turn an upstream body into a stream of chunks of at most [`MAX_CHUNK`]
/// bytes, in upstream order. Empty frames and trailers are skipped. An
/// upstream read error ends the stream.
pub fn relay_stream<B>(body: B, guard: RelayGuard) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Display,
{
    let state = RelayState {
        body,
        pending: Bytes::new(),
        guard,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if !state.pending.is_empty() {
                let chunk = next_chunk(&mut state.pending);
                state.guard.record_chunk(chunk.len());
                return Some((Ok(chunk), state));
            }

            match state.body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        state.pending = data;
                    }
                }
                Some(Err(e)) => {
                    state.guard.finish(RelayEnd::UpstreamReadError(e.to_string()));
                    return None;
                }
                None => {
                    state.guard.finish(RelayEnd::UpstreamEof);
                    return None;
                }
            }
        }
    })
}

/// Split off the next chunk without copying.
fn next_chunk(pending: &mut Bytes) -> Bytes {
    if pending.len() > MAX_CHUNK {
        pending.split_to(MAX_CHUNK)
    } else {
        std::mem::take(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayTracker;
    use futures_util::StreamExt;
    use http_body_util::StreamBody;
    use hyper::body::Frame;
    use std::io;

    fn body_of(
        frames: Vec<Result<Frame<Bytes>, io::Error>>,
    ) -> StreamBody<stream::Iter<std::vec::IntoIter<Result<Frame<Bytes>, io::Error>>>> {
        StreamBody::new(stream::iter(frames))
    }

    async fn collect(stream: impl Stream<Item = Result<Bytes, Infallible>>) -> Vec<Bytes> {
        stream
            .map(|item| match item {
                Ok(bytes) => bytes,
                Err(never) => match never {},
            })
            .collect()
            .await
    }

    #[tokio::test]
    async fn forwards_frames_in_order() {
        let tracker = RelayTracker::new();
        let body = body_of(vec![
            Ok(Frame::data(Bytes::from_static(b"event: token\ndata: a\n\n"))),
            Ok(Frame::data(Bytes::from_static(b"event: token\ndata: b\n\n"))),
        ]);

        let chunks = collect(relay_stream(body, tracker.track("s"))).await;
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"event: token\ndata: a\n\n"),
                Bytes::from_static(b"event: token\ndata: b\n\n"),
            ]
        );
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn skips_empty_frames_and_trailers() {
        let tracker = RelayTracker::new();
        let body = body_of(vec![
            Ok(Frame::data(Bytes::new())),
            Ok(Frame::data(Bytes::from_static(b"x"))),
            Ok(Frame::trailers(Default::default())),
        ]);

        let chunks = collect(relay_stream(body, tracker.track("s"))).await;
        assert_eq!(chunks, vec![Bytes::from_static(b"x")]);
    }

    #[tokio::test]
    async fn splits_large_frames_into_bounded_chunks() {
        let tracker = RelayTracker::new();
        let payload: Vec<u8> = (0..(MAX_CHUNK * 2 + 100)).map(|i| (i % 251) as u8).collect();
        let body = body_of(vec![Ok(Frame::data(Bytes::from(payload.clone())))]);

        let chunks = collect(relay_stream(body, tracker.track("s"))).await;
        assert_eq!(
            chunks.iter().map(Bytes::len).collect::<Vec<_>>(),
            vec![MAX_CHUNK, MAX_CHUNK, 100]
        );
        assert_eq!(chunks.concat(), payload);
    }

    #[tokio::test]
    async fn read_error_ends_stream_after_delivered_bytes() {
        let tracker = RelayTracker::new();
        let body = body_of(vec![
            Ok(Frame::data(Bytes::from_static(b"first"))),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Frame::data(Bytes::from_static(b"never"))),
        ]);

        let chunks = collect(relay_stream(body, tracker.track("s"))).await;
        assert_eq!(chunks, vec![Bytes::from_static(b"first")]);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn dropping_the_relay_releases_the_guard() {
        let tracker = RelayTracker::new();
        let body = body_of(vec![
            Ok(Frame::data(Bytes::from_static(b"a"))),
            Ok(Frame::data(Bytes::from_static(b"b"))),
        ]);

        let mut relay = Box::pin(relay_stream(body, tracker.track("s")));
        assert!(relay.next().await.is_some());
        assert_eq!(tracker.active_count(), 1);

        drop(relay);
        assert_eq!(tracker.active_count(), 0);
    }
}
