//! Per-request capture state
//!
//! One [`Exchange`] is created when a request enters the capture layer and is
//! threaded through every stage. It owns the buffered request, the routing
//! result, the response head, the body promise, the memoized events and the
//! two publish-once flags. Nothing in it is shared between requests.

use crate::content_type::ContentType;
use crate::events::{RequestEvent, ResponseEvent};
use crate::failure::HandlerFailure;
use crate::plugins::DecodeError;
use crate::promise::{BodyOutcome, BodyPromise, ResponseBody};
use crate::registry::DecoderRegistry;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, StatusCode, Uri};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// Immutable view of the inbound request and its buffered body
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
    pub body: Bytes,
}

impl RequestSnapshot {
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// scheme://authority/path, without the query string
    pub fn full_url(&self) -> String {
        let path = self.uri.path();
        if let (Some(scheme), Some(authority)) = (self.uri.scheme_str(), self.uri.authority()) {
            return format!("{}://{}{}", scheme, authority, path);
        }
        match self.header("host") {
            Some(host) => format!("http://{}{}", host, path),
            None => path.to_string(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<ContentType> {
        ContentType::from_headers(&self.headers)
    }
}

/// Routing result: matched template and extracted path parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub template: String,
    pub params: Vec<(String, String)>,
}

/// Status and headers of the response that is (or will be) sent
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn content_type(&self) -> Option<ContentType> {
        ContentType::from_headers(&self.headers)
    }
}

/// Capture state for one request/response cycle
#[derive(Debug)]
pub struct Exchange {
    id: String,
    started_at: DateTime<Utc>,
    started: Instant,
    request: RequestSnapshot,
    route: OnceLock<RouteMatch>,
    response_head: OnceLock<ResponseHead>,
    failure: OnceLock<Arc<HandlerFailure>>,
    promise: BodyPromise,
    response_body: OnceCell<ResponseBody>,
    pub(crate) request_event: OnceCell<Arc<RequestEvent>>,
    pub(crate) response_event: OnceCell<Arc<ResponseEvent>>,
    request_published: AtomicBool,
    response_published: AtomicBool,
}

impl Exchange {
    pub fn new(request: RequestSnapshot) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            started_at: Utc::now(),
            started: Instant::now(),
            request,
            route: OnceLock::new(),
            response_head: OnceLock::new(),
            failure: OnceLock::new(),
            promise: BodyPromise::new(),
            response_body: OnceCell::new(),
            request_event: OnceCell::new(),
            response_event: OnceCell::new(),
            request_published: AtomicBool::new(false),
            response_published: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wall-clock time the request entered the capture layer
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Monotonic time since the request entered the capture layer
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn request(&self) -> &RequestSnapshot {
        &self.request
    }

    // -------------------------------------------------------------------------
    // Routing
    // -------------------------------------------------------------------------

    /// Record the routing result. Returns false if a route was already set.
    pub fn set_route(&self, route: RouteMatch) -> bool {
        self.route.set(route).is_ok()
    }

    pub fn route(&self) -> Option<&RouteMatch> {
        self.route.get()
    }

    pub fn endpoint_exists(&self) -> bool {
        self.route.get().is_some()
    }

    // -------------------------------------------------------------------------
    // Response
    // -------------------------------------------------------------------------

    pub fn set_response_head(&self, status: StatusCode, headers: HeaderMap) -> bool {
        self.response_head
            .set(ResponseHead { status, headers })
            .is_ok()
    }

    pub fn response_head(&self) -> Option<&ResponseHead> {
        self.response_head.get()
    }

    /// Record a handler failure. Only the first failure is kept.
    pub fn record_failure(&self, failure: HandlerFailure) {
        let _ = self.failure.set(Arc::new(failure));
    }

    pub fn failure(&self) -> Option<&HandlerFailure> {
        self.failure.get().map(|f| f.as_ref())
    }

    pub fn body_promise(&self) -> &BodyPromise {
        &self.promise
    }

    /// Wait for the response body and decode it. The decode runs once; later
    /// calls return the cached result.
    pub async fn response_body(&self, decoders: &DecoderRegistry) -> ResponseBody {
        self.response_body
            .get_or_init(|| async {
                match self.promise.wait().await {
                    BodyOutcome::Complete(bytes) => {
                        let content_type = self.response_head().and_then(ResponseHead::content_type);
                        match decoders.decode(content_type.as_ref(), &bytes) {
                            Ok(payload) => ResponseBody::Decoded(Arc::new(payload)),
                            Err(e) => ResponseBody::Undecodable(Arc::new(e)),
                        }
                    }
                    BodyOutcome::Failed(failure) => ResponseBody::Failed(failure),
                    BodyOutcome::Abandoned => ResponseBody::Abandoned,
                }
            })
            .await
            .clone()
    }

    // -------------------------------------------------------------------------
    // Publish-once flags
    // -------------------------------------------------------------------------

    /// Atomically claim the right to publish the request event
    pub fn claim_request_publish(&self) -> bool {
        !self.request_published.swap(true, Ordering::AcqRel)
    }

    /// Atomically claim the right to publish the response event
    pub fn claim_response_publish(&self) -> bool {
        !self.response_published.swap(true, Ordering::AcqRel)
    }

    pub fn is_request_published(&self) -> bool {
        self.request_published.load(Ordering::Acquire)
    }

    pub fn is_response_published(&self) -> bool {
        self.response_published.load(Ordering::Acquire)
    }

    /// Memoized request event, if it has been built
    pub fn cached_request_event(&self) -> Option<&Arc<RequestEvent>> {
        self.request_event.get()
    }

    /// Memoized response event, if it has been built
    pub fn cached_response_event(&self) -> Option<&Arc<ResponseEvent>> {
        self.response_event.get()
    }
}

/// What response captors see once the body is resolved
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'a> {
    exchange: &'a Exchange,
    body: &'a ResponseBody,
}

impl<'a> ResponseView<'a> {
    pub fn new(exchange: &'a Exchange, body: &'a ResponseBody) -> Self {
        Self { exchange, body }
    }

    pub fn exchange(&self) -> &'a Exchange {
        self.exchange
    }

    pub fn request(&self) -> &'a RequestSnapshot {
        self.exchange.request()
    }

    /// `None` when the handler failed before a response was produced
    pub fn status(&self) -> Option<StatusCode> {
        self.exchange.response_head().map(|h| h.status)
    }

    pub fn headers(&self) -> Option<&'a HeaderMap> {
        self.exchange.response_head().map(|h| &h.headers)
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.exchange
            .response_head()
            .and_then(ResponseHead::content_type)
    }

    pub fn body(&self) -> &'a ResponseBody {
        self.body
    }

    /// Handler failure, either raised by the handler or by the body stream
    pub fn failure(&self) -> Option<&'a HandlerFailure> {
        self.exchange.failure().or_else(|| self.body.failure())
    }

    pub fn decode_error(&self) -> Option<&'a DecodeError> {
        match self.body {
            ResponseBody::Undecodable(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
