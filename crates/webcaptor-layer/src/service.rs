//! Capture middleware
//!
//! [`CaptureLayer`] wraps a tower service (usually an axum `Router`). For each
//! request that passes the enabled switch and exclusion rules it:
//!
//! 1. buffers the request body and creates the [`Exchange`],
//! 2. publishes the request event right away when routing has already matched,
//! 3. calls the handler with a replay of the buffered body, catching errors
//!    and panics,
//! 4. completes the body promise (immediately for buffered responses, at end
//!    of stream for streaming ones) and publishes the response event.

use crate::buffer::{self, TeeBody};
use crate::funnel::{self, build_response};
use crate::resolver::JsonExceptionResolver;
use crate::route::{route_match, CaptureHandle};
use axum::body::Body;
use axum::extract::{ConnectInfo, MatchedPath};
use axum::BoxError;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::{Request, Response};
use std::fmt;
use std::net::SocketAddr;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::debug;
use webcaptor_core::plugins::{ErrorResponse, ExceptionResolver};
use webcaptor_core::{CapturePipeline, ContentType, Exchange, HandlerFailure, RequestSnapshot};

/// Layer that applies [`CaptureService`]
#[derive(Clone)]
pub struct CaptureLayer {
    pipeline: Arc<CapturePipeline>,
    resolvers: Arc<Vec<Box<dyn ExceptionResolver>>>,
}

impl CaptureLayer {
    /// Capture through `pipeline`, rendering failures with
    /// [`JsonExceptionResolver`]
    pub fn new(pipeline: Arc<CapturePipeline>) -> Self {
        Self {
            pipeline,
            resolvers: Arc::new(vec![Box::new(JsonExceptionResolver::new())]),
        }
    }

    /// Replace the exception resolvers. With none, failures are propagated
    /// to the caller after the response event is published.
    pub fn with_resolvers(mut self, resolvers: Vec<Box<dyn ExceptionResolver>>) -> Self {
        self.resolvers = Arc::new(resolvers);
        self
    }

    pub fn pipeline(&self) -> &Arc<CapturePipeline> {
        &self.pipeline
    }
}

impl<S> Layer<S> for CaptureLayer {
    type Service = CaptureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CaptureService {
            inner,
            pipeline: self.pipeline.clone(),
            resolvers: self.resolvers.clone(),
        }
    }
}

impl fmt::Debug for CaptureLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureLayer")
            .field("resolvers", &self.resolvers.len())
            .finish_non_exhaustive()
    }
}

/// Middleware service created by [`CaptureLayer`]
#[derive(Clone)]
pub struct CaptureService<S> {
    inner: S,
    pipeline: Arc<CapturePipeline>,
    resolvers: Arc<Vec<Box<dyn ExceptionResolver>>>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CaptureService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
    ReqBody: http_body::Body<Data = Bytes> + Send + 'static,
    ReqBody::Error: Into<BoxError>,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        // The ready service goes into the future; keep a fresh clone
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let pipeline = self.pipeline.clone();

        if !pipeline.should_capture(request.method(), request.uri().path()) {
            debug!("Not capturing {} {}", request.method(), request.uri().path());
            let mut inner = inner;
            let future = inner.call(request.map(Body::new));
            return async move { future.await.map(|response| response.map(Body::new)) }.boxed();
        }

        let resolvers = self.resolvers.clone();
        capture(inner, pipeline, resolvers, request).boxed()
    }
}

async fn capture<S, ReqBody, ResBody>(
    mut inner: S,
    pipeline: Arc<CapturePipeline>,
    resolvers: Arc<Vec<Box<dyn ExceptionResolver>>>,
    request: Request<ReqBody>,
) -> Result<Response<Body>, S::Error>
where
    S: Service<Request<Body>, Response = Response<ResBody>>,
    S::Error: fmt::Display,
    ReqBody: http_body::Body<Data = Bytes> + Send + 'static,
    ReqBody::Error: Into<BoxError>,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    let (mut parts, body) = request.into_parts();
    let buffered = buffer::buffer(body, pipeline.max_body_bytes()).await;

    let exchange = Arc::new(Exchange::new(RequestSnapshot {
        method: parts.method.clone(),
        uri: parts.uri.clone(),
        headers: parts.headers.clone(),
        remote_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
        body: buffered.captured(),
    }));
    debug!(
        "Capturing {} {} as exchange {}",
        parts.method,
        parts.uri.path(),
        exchange.id()
    );

    // Routing already happened when the layer runs inside the router
    if parts.extensions.get::<MatchedPath>().is_some() {
        if let Some(route) = route_match(&mut parts).await {
            exchange.set_route(route);
            pipeline.publish_request(&exchange).await;
        }
    }

    parts
        .extensions
        .insert(CaptureHandle::new(exchange.clone(), pipeline.clone()));
    let request = Request::from_parts(parts, Body::new(buffered.replay()));

    let result = match catch_unwind(AssertUnwindSafe(|| inner.call(request))) {
        Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
        Err(payload) => Err(payload),
    };

    match result {
        Ok(Ok(response)) => Ok(complete(&pipeline, &exchange, &resolvers, response).await),
        Ok(Err(error)) => {
            let failure = HandlerFailure::from_error(&error);
            match funnel::funnel(&pipeline, &exchange, &resolvers, failure).await {
                Some(response) => Ok(response),
                None => Err(error),
            }
        }
        Err(payload) => {
            let failure = HandlerFailure::from_panic(payload.as_ref());
            match funnel::funnel(&pipeline, &exchange, &resolvers, failure).await {
                Some(response) => Ok(response),
                None => resume_unwind(payload),
            }
        }
    }
}

/// Handle a response the handler produced successfully
async fn complete<ResBody>(
    pipeline: &Arc<CapturePipeline>,
    exchange: &Arc<Exchange>,
    resolvers: &[Box<dyn ExceptionResolver>],
    response: Response<ResBody>,
) -> Response<Body>
where
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    let (parts, body) = response.into_parts();
    let streaming = ContentType::from_headers(&parts.headers)
        .is_some_and(|ct| pipeline.is_streaming(ct.as_str()));

    if streaming {
        // Headers are committed now; the body completes on another task
        exchange.set_response_head(parts.status, parts.headers.clone());
        pipeline.publish_request(exchange).await;

        let tee = TeeBody::new(
            body,
            exchange.body_promise().resolver(),
            pipeline.max_body_bytes(),
        );
        let pipeline = pipeline.clone();
        let exchange = exchange.clone();
        tokio::spawn(async move {
            pipeline.publish_response(&exchange).await;
        });
        return Response::from_parts(parts, Body::new(tee));
    }

    let mut buffered = buffer::buffer(body, pipeline.max_body_bytes()).await;
    if let Some(error) = buffered.error.take() {
        let failure = HandlerFailure::body_stream(&*error);
        return match funnel::funnel(pipeline, exchange, resolvers, failure).await {
            Some(response) => response,
            None => {
                let fallback = ErrorResponse::new();
                build_response(fallback.status, fallback.headers, Bytes::new())
            }
        };
    }

    exchange.set_response_head(parts.status, parts.headers.clone());
    if let Some(resolver) = exchange.body_promise().resolver() {
        resolver.resolve(buffered.captured());
    }
    funnel::publish(pipeline, exchange).await;

    // Past the limit the rest of the body was never read
    if buffered.is_truncated() {
        return Response::from_parts(parts, Body::new(buffered.replay()));
    }
    Response::from_parts(parts, Body::from(buffered.bytes))
}
