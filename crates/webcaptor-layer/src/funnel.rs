//! Error funnel
//!
//! Turns a handler failure into user-visible error content and a response
//! event carrying error detail. Resolvers run in order on a reset response;
//! the first one that handles the failure wins.

use axum::body::Body;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};
use webcaptor_core::plugins::{ErrorResponse, ExceptionResolver, PluginInfo, Resolution};
use webcaptor_core::{CapturePipeline, Exchange, HandlerFailure};

/// Run the resolvers against a fresh error response
fn resolve(
    exchange: &Exchange,
    resolvers: &[Box<dyn ExceptionResolver>],
    failure: &HandlerFailure,
) -> Option<ErrorResponse> {
    let mut response = ErrorResponse::new();
    for resolver in resolvers {
        let result = catch_unwind(AssertUnwindSafe(|| {
            resolver.resolve(exchange, failure, &mut response)
        }));
        match result {
            Ok(Resolution::Handled) => {
                debug!("Failure handled by {}", resolver.name());
                return Some(response);
            }
            Ok(Resolution::NotHandled) => {}
            Err(_) => {
                warn!("Exception resolver {} panicked", resolver.name());
                response.reset();
            }
        }
    }
    None
}

/// Publish whatever is still pending for the exchange
pub(crate) async fn publish(pipeline: &CapturePipeline, exchange: &Exchange) {
    pipeline.publish_request(exchange).await;
    pipeline.publish_response(exchange).await;
}

pub(crate) fn build_response(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Funnel a failure raised before the response was committed. Returns the
/// resolved error response, or `None` when no resolver handled the failure;
/// the response event is published either way.
pub(crate) async fn funnel(
    pipeline: &CapturePipeline,
    exchange: &Exchange,
    resolvers: &[Box<dyn ExceptionResolver>],
    failure: HandlerFailure,
) -> Option<Response<Body>> {
    warn!(
        "Handler failed for {} {}: {}",
        exchange.request().method,
        exchange.request().path(),
        failure
    );

    let resolved = resolve(exchange, resolvers, &failure);
    exchange.record_failure(failure.clone());

    match resolved {
        Some(response) => {
            let body = response.body.freeze();
            exchange.set_response_head(response.status, response.headers.clone());
            if let Some(resolver) = exchange.body_promise().resolver() {
                resolver.resolve(body.clone());
            }
            publish(pipeline, exchange).await;
            Some(build_response(response.status, response.headers, body))
        }
        None => {
            if let Some(resolver) = exchange.body_promise().resolver() {
                resolver.reject(failure);
            }
            publish(pipeline, exchange).await;
            None
        }
    }
}
