//! Routing metadata and the in-router publish trigger

use axum::extract::{FromRequestParts, MatchedPath, RawPathParams, Request};
use axum::middleware::Next;
use axum::response::Response;
use http::request::Parts;
use std::sync::Arc;
use tracing::debug;
use webcaptor_core::{CapturePipeline, Exchange, RouteMatch};

/// Per-request capture handle, inserted into request extensions by the
/// capture layer. Handlers and middleware reach the exchange through it.
#[derive(Clone)]
pub struct CaptureHandle {
    exchange: Arc<Exchange>,
    pipeline: Arc<CapturePipeline>,
}

impl CaptureHandle {
    pub(crate) fn new(exchange: Arc<Exchange>, pipeline: Arc<CapturePipeline>) -> Self {
        Self { exchange, pipeline }
    }

    pub fn exchange(&self) -> &Arc<Exchange> {
        &self.exchange
    }

    /// Record the routing result and publish the request event. Returns true
    /// if this call published it.
    pub async fn mark_route(&self, route: RouteMatch) -> bool {
        if !self.exchange.set_route(route) {
            return false;
        }
        self.pipeline.publish_request(&self.exchange).await
    }
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("exchange", &self.exchange.id())
            .finish_non_exhaustive()
    }
}

/// Route template and path parameters, if routing matched
pub(crate) async fn route_match(parts: &mut Parts) -> Option<RouteMatch> {
    let template = parts.extensions.get::<MatchedPath>()?.as_str().to_string();
    let params = match RawPathParams::from_request_parts(parts, &()).await {
        Ok(params) => params
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
        Err(e) => {
            debug!("No path parameters for {}: {}", template, e);
            Vec::new()
        }
    };
    Some(RouteMatch { template, params })
}

/// Route-layer middleware that publishes the request event as soon as routing
/// has matched. Needed when the capture layer wraps the router from outside,
/// where the matched route is not yet known:
///
/// ```ignore
/// let app = Router::new()
///     .route("/users/{id}", get(user))
///     .route_layer(axum::middleware::from_fn(mark_route));
/// let service = CaptureLayer::new(pipeline).layer(app);
/// ```
pub async fn mark_route(request: Request, next: Next) -> Response {
    let Some(handle) = request.extensions().get::<CaptureHandle>().cloned() else {
        return next.run(request).await;
    };

    let (mut parts, body) = request.into_parts();
    if let Some(route) = route_match(&mut parts).await {
        handle.mark_route(route).await;
    }
    next.run(Request::from_parts(parts, body)).await
}
