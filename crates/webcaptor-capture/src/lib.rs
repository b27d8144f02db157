//! Built-in field captors for webcaptor
//!
//! Each captor extracts one field of a request or response into its event
//! builder. [`default_registry`] registers the captors whose toggle under
//! `[event_details]` is on; a disabled field is then absent from every event.

pub mod error_attributes;
pub mod request;
pub mod response;

pub use error_attributes::DefaultErrorAttributes;
pub use request::{
    EndpointExistsCaptor, FullUrlCaptor, MethodCaptor, PathCaptor, PathParamsCaptor,
    QueryParamsCaptor, RequestBodyCaptor, RequestHeadersCaptor,
};
pub use response::{ResponseBodyCaptor, ResponseErrorCaptor, ResponseHeadersCaptor, StatusCaptor};

use std::sync::Arc;
use tracing::debug;
use webcaptor_core::config::CaptorConfig;
use webcaptor_core::plugins::ErrorAttributes;
use webcaptor_core::registry::{CaptorRegistry, DecoderRegistry};

/// Captor registry for the configured event details
pub fn default_registry(
    config: &CaptorConfig,
    decoders: Arc<DecoderRegistry>,
    error_attributes: Arc<dyn ErrorAttributes>,
) -> CaptorRegistry {
    let details = &config.event_details;
    let mut registry = CaptorRegistry::new();

    if details.include_endpoint_exists {
        registry.register_request(Box::new(EndpointExistsCaptor));
    }
    if details.include_full_url {
        registry.register_request(Box::new(FullUrlCaptor));
    }
    if details.include_path {
        registry.register_request(Box::new(PathCaptor));
    }
    if details.include_method {
        registry.register_request(Box::new(MethodCaptor));
    }
    if details.include_request_headers {
        registry.register_request(Box::new(RequestHeadersCaptor));
    }
    if details.include_query_params {
        registry.register_request(Box::new(QueryParamsCaptor));
    }
    if details.include_path_params {
        registry.register_request(Box::new(PathParamsCaptor));
    }
    if details.include_request_body {
        registry.register_request(Box::new(RequestBodyCaptor::new(decoders)));
    }

    if details.include_response_status {
        registry.register_response(Box::new(StatusCaptor));
    }
    if details.include_response_headers {
        registry.register_response(Box::new(ResponseHeadersCaptor));
    }
    if details.include_response_body {
        registry.register_response(Box::new(ResponseBodyCaptor));
    }
    if details.include_error_details {
        registry.register_response(Box::new(ResponseErrorCaptor::new(error_attributes)));
    }

    debug!(
        "Registered captors: request={:?} response={:?}",
        registry.request_captors(),
        registry.response_captors()
    );
    registry
}
