//! Deferred response body completion
//!
//! The response body is not always final when the handler returns: streaming
//! bodies finish later on another task. [`BodyPromise`] is a resolve-once,
//! many-waiter primitive; the single [`BodyResolver`] may be moved to whichever
//! task observes the end of the body.

use crate::events::BodyPayload;
use crate::failure::HandlerFailure;
use crate::plugins::DecodeError;
use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Raw outcome of the response body
#[derive(Debug, Clone)]
pub enum BodyOutcome {
    /// All bytes were produced
    Complete(Bytes),
    /// The body stream failed
    Failed(Arc<HandlerFailure>),
    /// The resolver was dropped without completing (body never finished)
    Abandoned,
}

/// Decoded response body, computed once per exchange
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Decoded(Arc<BodyPayload>),
    Undecodable(Arc<DecodeError>),
    Failed(Arc<HandlerFailure>),
    Abandoned,
}

impl ResponseBody {
    pub fn payload(&self) -> Option<&BodyPayload> {
        match self {
            ResponseBody::Decoded(payload) => Some(payload.as_ref()),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&HandlerFailure> {
        match self {
            ResponseBody::Failed(failure) => Some(failure.as_ref()),
            _ => None,
        }
    }
}

/// Resolve-once promise for the response body
pub struct BodyPromise {
    future: Shared<BoxFuture<'static, BodyOutcome>>,
    resolver: Mutex<Option<BodyResolver>>,
    closed: Arc<AtomicBool>,
}

impl BodyPromise {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel::<Result<Bytes, HandlerFailure>>();
        let future = async move {
            match rx.await {
                Ok(Ok(bytes)) => BodyOutcome::Complete(bytes),
                Ok(Err(failure)) => BodyOutcome::Failed(Arc::new(failure)),
                Err(_) => BodyOutcome::Abandoned,
            }
        }
        .boxed()
        .shared();

        let closed = Arc::new(AtomicBool::new(false));
        Self {
            future,
            resolver: Mutex::new(Some(BodyResolver {
                tx,
                closed: closed.clone(),
            })),
            closed,
        }
    }

    /// Take the producer side. Only the first call gets it.
    pub fn resolver(&self) -> Option<BodyResolver> {
        self.resolver.lock().take()
    }

    /// Wait for the outcome. Every waiter observes the same value.
    pub fn wait(&self) -> Shared<BoxFuture<'static, BodyOutcome>> {
        self.future.clone()
    }

    /// Outcome if already resolved, whether or not anyone has waited yet
    pub fn peek(&self) -> Option<BodyOutcome> {
        self.future
            .peek()
            .cloned()
            .or_else(|| self.future.clone().now_or_never())
    }

    /// Tell the producer nobody will wait for the outcome any more
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for BodyPromise {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BodyPromise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyPromise")
            .field("resolved", &self.peek().is_some())
            .finish()
    }
}

/// Producer side of a [`BodyPromise`]. Dropping it abandons the promise.
#[derive(Debug)]
pub struct BodyResolver {
    tx: oneshot::Sender<Result<Bytes, HandlerFailure>>,
    closed: Arc<AtomicBool>,
}

impl BodyResolver {
    /// True once the waiter gave up or the promise itself is gone
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }

    pub fn resolve(self, bytes: Bytes) {
        let _ = self.tx.send(Ok(bytes));
    }

    pub fn reject(self, failure: HandlerFailure) {
        let _ = self.tx.send(Err(failure));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureKind;

    #[tokio::test]
    async fn test_resolve_many_waiters() {
        let promise = BodyPromise::new();
        let first = promise.wait();
        let second = promise.wait();

        let resolver = promise.resolver().unwrap();
        assert!(promise.resolver().is_none());
        tokio::spawn(async move { resolver.resolve(Bytes::from_static(b"done")) });

        for outcome in [first.await, second.await] {
            match outcome {
                BodyOutcome::Complete(bytes) => assert_eq!(&bytes[..], b"done"),
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
        assert!(matches!(promise.peek(), Some(BodyOutcome::Complete(_))));
    }

    #[tokio::test]
    async fn test_reject() {
        let promise = BodyPromise::new();
        promise
            .resolver()
            .unwrap()
            .reject(HandlerFailure::new(FailureKind::BodyStream, "reset"));

        match promise.wait().await {
            BodyOutcome::Failed(failure) => assert_eq!(failure.message, "reset"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_resolver_abandons() {
        let promise = BodyPromise::new();
        drop(promise.resolver());
        assert!(matches!(promise.wait().await, BodyOutcome::Abandoned));
    }

    #[test]
    fn test_unresolved_peek() {
        let promise = BodyPromise::new();
        assert!(promise.peek().is_none());
        assert_eq!(format!("{:?}", promise), "BodyPromise { resolved: false }");
    }

    #[test]
    fn test_peek_before_any_waiter() {
        let promise = BodyPromise::new();
        promise.resolver().unwrap().resolve(Bytes::from_static(b"early"));

        match promise.peek() {
            Some(BodyOutcome::Complete(bytes)) => assert_eq!(&bytes[..], b"early"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(format!("{:?}", promise), "BodyPromise { resolved: true }");
    }

    #[test]
    fn test_close_is_seen_by_resolver() {
        let promise = BodyPromise::new();
        let resolver = promise.resolver().unwrap();
        assert!(!resolver.is_closed());

        promise.close();
        assert!(promise.is_closed());
        assert!(resolver.is_closed());
    }

    #[test]
    fn test_dropped_promise_closes_resolver() {
        let promise = BodyPromise::new();
        let resolver = promise.resolver().unwrap();
        drop(promise);
        assert!(resolver.is_closed());
    }
}
