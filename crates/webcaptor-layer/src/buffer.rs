//! Request and response body buffering
//!
//! Request bodies are drained once so the bytes can be both captured and
//! replayed to the handler. Streaming response bodies are teed: frames pass
//! through untouched while a copy accumulates for the body promise.

use axum::BoxError;
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tracing::debug;
use webcaptor_core::{BodyResolver, HandlerFailure};

type Body = axum::body::Body;

/// A drained body. When the stream failed, `bytes` holds what arrived before
/// the error. When it outgrew the capture limit, reading stopped early and
/// the unread remainder is kept for the replay.
pub struct BufferedBody {
    /// Everything read so far
    pub bytes: Bytes,
    pub error: Option<BoxError>,
    rest: Option<Body>,
    limit: usize,
}

impl BufferedBody {
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && !self.is_truncated()
    }

    /// Whether the body is longer than the capture limit
    pub fn is_truncated(&self) -> bool {
        self.bytes.len() > self.limit
    }

    /// The bytes handed to capture: at most the limit
    pub fn captured(&self) -> Bytes {
        self.bytes.slice(..self.bytes.len().min(self.limit))
    }

    /// Body that re-emits the buffered bytes, then the original error or the
    /// unread remainder
    pub fn replay(self) -> ReplayBody {
        ReplayBody {
            data: Some(self.bytes),
            error: self.error,
            rest: self.rest,
        }
    }
}

impl fmt::Debug for BufferedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedBody")
            .field("len", &self.bytes.len())
            .field("error", &self.error)
            .field("truncated", &self.is_truncated())
            .finish()
    }
}

/// Drain a body into memory, stopping at the first error or once more than
/// `limit` bytes were read. Trailers are dropped.
pub async fn buffer<B>(body: B, limit: usize) -> BufferedBody
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let mut body = Body::new(body);
    let mut collected = BytesMut::new();

    loop {
        if collected.len() > limit {
            debug!("Body exceeds capture limit of {} bytes", limit);
            let rest = (!body.is_end_stream()).then_some(body);
            return BufferedBody {
                bytes: collected.freeze(),
                error: None,
                rest,
                limit,
            };
        }
        match body.frame().await {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    collected.extend_from_slice(data);
                }
            }
            Some(Err(e)) => {
                return BufferedBody {
                    bytes: collected.freeze(),
                    error: Some(e.into_inner()),
                    rest: None,
                    limit,
                };
            }
            None => break,
        }
    }

    BufferedBody {
        bytes: collected.freeze(),
        error: None,
        rest: None,
        limit,
    }
}

/// Replays buffered bytes to the handler, followed by the rest of the
/// original body when it was not read to the end
pub struct ReplayBody {
    data: Option<Bytes>,
    error: Option<BoxError>,
    rest: Option<Body>,
}

impl HttpBody for ReplayBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if let Some(data) = self.data.take().filter(|d| !d.is_empty()) {
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }
        if let Some(error) = self.error.take() {
            return Poll::Ready(Some(Err(error)));
        }
        match self.rest.as_mut() {
            Some(rest) => Pin::new(rest).poll_frame(cx).map_err(axum::Error::into_inner),
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.data.as_ref().map_or(true, Bytes::is_empty)
            && self.error.is_none()
            && self.rest.as_ref().map_or(true, HttpBody::is_end_stream)
    }

    fn size_hint(&self) -> SizeHint {
        let buffered = self.data.as_ref().map_or(0, |d| d.len() as u64);
        match (&self.error, &self.rest) {
            (None, None) => SizeHint::with_exact(buffered),
            (None, Some(rest)) => {
                let remaining = rest.size_hint();
                let mut hint = SizeHint::new();
                hint.set_lower(remaining.lower() + buffered);
                if let Some(upper) = remaining.upper() {
                    hint.set_upper(upper + buffered);
                }
                hint
            }
            _ => SizeHint::default(),
        }
    }
}

impl fmt::Debug for ReplayBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayBody")
            .field("data", &self.data)
            .field("error", &self.error)
            .field("has_rest", &self.rest.is_some())
            .finish()
    }
}

pin_project! {
    /// Passes a streaming response body through while keeping a copy of at
    /// most `limit` bytes.
    ///
    /// The body promise is resolved at end of stream, rejected on a stream
    /// error, and abandoned if the body is dropped before it finishes. Once
    /// the waiter gives up, copying stops and the copy is released.
    pub struct TeeBody<B> {
        #[pin]
        inner: B,
        copy: BytesMut,
        limit: usize,
        resolver: Option<BodyResolver>,
    }
}

impl<B> TeeBody<B>
where
    B: HttpBody<Data = Bytes>,
{
    pub fn new(inner: B, resolver: Option<BodyResolver>, limit: usize) -> Self {
        let mut tee = Self {
            inner,
            copy: BytesMut::new(),
            limit,
            resolver,
        };
        // An empty body may never be polled
        if tee.inner.is_end_stream() {
            if let Some(resolver) = tee.resolver.take() {
                resolver.resolve(Bytes::new());
            }
        }
        tee
    }
}

impl<B> HttpBody for TeeBody<B>
where
    B: HttpBody<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        match ready!(this.inner.as_mut().poll_frame(cx)) {
            Some(Ok(frame)) => {
                if this.resolver.as_ref().is_some_and(BodyResolver::is_closed) {
                    debug!("Body waiter gone; releasing {} copied bytes", this.copy.len());
                    this.resolver.take();
                    *this.copy = BytesMut::new();
                }
                if this.resolver.is_some() {
                    if let Some(data) = frame.data_ref() {
                        let room = this.limit.saturating_sub(this.copy.len());
                        this.copy.extend_from_slice(&data[..data.len().min(room)]);
                    }
                }
                // The server may stop polling once the body reports its end
                if this.inner.is_end_stream() {
                    if let Some(resolver) = this.resolver.take() {
                        resolver.resolve(this.copy.split().freeze());
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(e)) => {
                let error: BoxError = e.into();
                if let Some(resolver) = this.resolver.take() {
                    resolver.reject(HandlerFailure::body_stream(&*error));
                }
                Poll::Ready(Some(Err(error)))
            }
            None => {
                if let Some(resolver) = this.resolver.take() {
                    resolver.resolve(this.copy.split().freeze());
                }
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use http_body_util::{Full, StreamBody};
    use webcaptor_core::{BodyOutcome, BodyPromise, FailureKind};

    const NO_LIMIT: usize = usize::MAX;

    fn chunked(chunks: &[&'static [u8]]) -> StreamBody<impl futures_util::Stream<Item = Result<Frame<Bytes>, std::io::Error>>> {
        let frames: Vec<_> = chunks
            .iter()
            .copied()
            .map(|chunk| Ok::<_, std::io::Error>(Frame::data(Bytes::from_static(chunk))))
            .collect();
        StreamBody::new(stream::iter(frames))
    }

    fn failing_body() -> StreamBody<impl futures_util::Stream<Item = Result<Frame<Bytes>, std::io::Error>>> {
        StreamBody::new(stream::iter(vec![
            Ok(Frame::data(Bytes::from_static(b"part"))),
            Err(std::io::Error::other("connection reset")),
        ]))
    }

    #[tokio::test]
    async fn test_buffer_complete() {
        let buffered = buffer(Full::new(Bytes::from_static(b"{\"a\":1}")), NO_LIMIT).await;
        assert!(buffered.is_complete());
        assert_eq!(&buffered.bytes[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_buffer_error_keeps_partial_and_replays_error() {
        let buffered = buffer(failing_body(), NO_LIMIT).await;
        assert!(!buffered.is_complete());
        assert_eq!(&buffered.bytes[..], b"part");

        let mut replay = buffered.replay();
        let first = replay.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), Bytes::from_static(b"part"));
        let second = replay.frame().await.unwrap();
        assert_eq!(second.unwrap_err().to_string(), "connection reset");
        assert!(replay.frame().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_replay() {
        let mut replay = buffer(Full::new(Bytes::new()), NO_LIMIT).await.replay();
        assert!(replay.is_end_stream());
        assert!(replay.frame().await.is_none());
    }

    #[tokio::test]
    async fn test_tee_resolves_at_end() {
        let promise = BodyPromise::new();
        let tee = TeeBody::new(
            StreamBody::new(stream::iter(vec![
                Ok::<_, std::io::Error>(Frame::data(Bytes::from_static(b"data: 1\n\n"))),
                Ok(Frame::data(Bytes::from_static(b"data: 2\n\n"))),
            ])),
            promise.resolver(),
            NO_LIMIT,
        );

        let collected = tee.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"data: 1\n\ndata: 2\n\n");
        match promise.wait().await {
            BodyOutcome::Complete(bytes) => assert_eq!(bytes, collected),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tee_empty_body_resolves_immediately() {
        let promise = BodyPromise::new();
        let _tee = TeeBody::new(Full::new(Bytes::new()), promise.resolver(), NO_LIMIT);
        assert!(matches!(promise.peek(), Some(BodyOutcome::Complete(b)) if b.is_empty()));
    }

    #[tokio::test]
    async fn test_tee_rejects_on_error() {
        let promise = BodyPromise::new();
        let tee = TeeBody::new(failing_body(), promise.resolver(), NO_LIMIT);
        assert!(tee.collect().await.is_err());

        match promise.wait().await {
            BodyOutcome::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::BodyStream);
                assert_eq!(failure.message, "connection reset");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tee_dropped_is_abandoned() {
        let promise = BodyPromise::new();
        let tee = TeeBody::new(
            StreamBody::new(stream::pending::<Result<Frame<Bytes>, std::io::Error>>()),
            promise.resolver(),
            NO_LIMIT,
        );
        drop(tee);
        assert!(matches!(promise.wait().await, BodyOutcome::Abandoned));
    }

    #[tokio::test]
    async fn test_buffer_stops_at_limit_and_replays_rest() {
        let buffered = buffer(chunked(&[b"aaaa", b"bbbb", b"cccc"]), 5).await;
        assert!(buffered.is_truncated());
        assert!(!buffered.is_complete());
        assert_eq!(&buffered.bytes[..], b"aaaabbbb");
        assert_eq!(&buffered.captured()[..], b"aaaab");

        let replayed = buffered.replay().collect().await.unwrap().to_bytes();
        assert_eq!(&replayed[..], b"aaaabbbbcccc");
    }

    #[tokio::test]
    async fn test_buffer_at_exact_limit_is_complete() {
        let buffered = buffer(chunked(&[b"abc", b"de"]), 5).await;
        assert!(buffered.is_complete());
        assert_eq!(&buffered.captured()[..], b"abcde");
    }

    #[tokio::test]
    async fn test_tee_copies_up_to_limit() {
        let promise = BodyPromise::new();
        let tee = TeeBody::new(chunked(&[b"0123", b"4567", b"89"]), promise.resolver(), 6);

        let collected = tee.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"0123456789");
        match promise.wait().await {
            BodyOutcome::Complete(bytes) => assert_eq!(&bytes[..], b"012345"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tee_releases_copy_once_waiter_gives_up() {
        let promise = BodyPromise::new();
        let mut tee = TeeBody::new(
            chunked(&[b"first", b"second", b"third"]),
            promise.resolver(),
            NO_LIMIT,
        );

        tee.frame().await.unwrap().unwrap();
        assert_eq!(&tee.copy[..], b"first");

        promise.close();
        let frame = tee.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"second"));
        assert!(tee.copy.is_empty());
        assert!(tee.resolver.is_none());

        let rest = tee.collect().await.unwrap().to_bytes();
        assert_eq!(&rest[..], b"third");
        assert!(matches!(promise.wait().await, BodyOutcome::Abandoned));
    }
}
