//! Plugin traits for all capture stages
//!
//! webcaptor is built on a plugin architecture. Decoding, field capture,
//! enrichment, error resolution and export are each defined as a trait so the
//! built-in implementations can be replaced or extended.

use crate::content_type::ContentType;
use crate::events::{
    BodyPayload, CaptureEvent, RequestEvent, RequestEventBuilder, ResponseEvent,
    ResponseEventBuilder,
};
use crate::exchange::{Exchange, ResponseView};
use crate::failure::HandlerFailure;
use async_trait::async_trait;
use bytes::BytesMut;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::{Map, Value};
use thiserror::Error;

/// Plugin error type
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin operation failed: {0}")]
    OperationFailed(String),

    #[error("Plugin configuration error: {0}")]
    ConfigurationError(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Basic plugin information
pub trait PluginInfo {
    /// Plugin name
    fn name(&self) -> &str;

    /// Plugin version
    fn version(&self) -> &str;

    /// Plugin description
    fn description(&self) -> &str {
        ""
    }
}

/// Key/value data contributed by an enricher
pub type ExtensionData = Map<String, Value>;

/// Error attributes attached to a response event
pub type ErrorDetail = Map<String, Value>;

// =============================================================================
// DECODERS
// =============================================================================

/// Body decoding error
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed {content_type} body: {reason}")]
    Malformed {
        content_type: String,
        reason: String,
    },

    #[error("Multipart body has no boundary parameter")]
    MissingBoundary,

    #[error("No decoder accepted content type {0:?}")]
    NoDecoder(Option<String>),
}

impl DecodeError {
    pub fn malformed(content_type: Option<&ContentType>, reason: impl ToString) -> Self {
        DecodeError::Malformed {
            content_type: content_type
                .map(|c| c.essence())
                .unwrap_or_else(|| "untyped".to_string()),
            reason: reason.to_string(),
        }
    }
}

/// Body decoder - turns raw bytes of a declared content type into a value tree
pub trait BodyDecoder: PluginInfo + Send + Sync {
    /// Priority for decoder selection (lower = tried first)
    fn priority(&self) -> i32 {
        0
    }

    /// Check if this decoder handles the declared content type
    fn supports(&self, content_type: Option<&ContentType>) -> bool;

    /// Decode the body. An error means "does not apply" to the registry.
    fn decode(
        &self,
        content_type: Option<&ContentType>,
        bytes: &[u8],
    ) -> Result<BodyPayload, DecodeError>;
}

// =============================================================================
// FIELD CAPTORS
// =============================================================================

/// Extracts one field of the request into the event builder
pub trait RequestFieldCaptor: PluginInfo + Send + Sync {
    /// Execution order (lower = runs first)
    fn priority(&self) -> i32 {
        0
    }

    fn capture(&self, exchange: &Exchange, event: &mut RequestEventBuilder) -> PluginResult<()>;
}

/// Extracts one field of the response into the event builder
pub trait ResponseFieldCaptor: PluginInfo + Send + Sync {
    /// Execution order (lower = runs first)
    fn priority(&self) -> i32 {
        0
    }

    fn capture(
        &self,
        response: &ResponseView<'_>,
        event: &mut ResponseEventBuilder,
    ) -> PluginResult<()>;
}

// =============================================================================
// PUBLISH CONDITIONS
// =============================================================================

/// Decides whether an exchange's request event is handed to the sinks.
/// Every registered condition must agree.
pub trait RequestPublishCondition: PluginInfo + Send + Sync {
    fn should_publish_request(&self, exchange: &Exchange) -> bool;
}

/// Decides whether a response event is handed to the sinks. Evaluated once
/// the response head and body are known.
pub trait ResponsePublishCondition: PluginInfo + Send + Sync {
    fn should_publish_response(&self, response: &ResponseView<'_>) -> bool;
}

// =============================================================================
// ENRICHERS
// =============================================================================

/// Enricher - adds supplementary data to assembled events
#[async_trait]
pub trait EventEnricher: PluginInfo + Send + Sync {
    /// Data merged into the request event's `additional_data`
    async fn enrich_request(
        &self,
        exchange: &Exchange,
        request: &RequestEvent,
    ) -> PluginResult<ExtensionData> {
        let _ = (exchange, request);
        Ok(ExtensionData::new())
    }

    /// Data merged into the response event's `additional_data`
    async fn enrich_response(
        &self,
        exchange: &Exchange,
        request: &RequestEvent,
        response: &ResponseEvent,
    ) -> PluginResult<ExtensionData> {
        let _ = (exchange, request, response);
        Ok(ExtensionData::new())
    }
}

// =============================================================================
// SINKS
// =============================================================================

/// Event sink - receives each published event. Fire-and-forget: failures are
/// the sink's own concern and are never reported back.
pub trait EventSink: PluginInfo + Send + Sync {
    fn publish(&self, event: CaptureEvent);

    /// Flush any buffered events
    fn flush(&self) {}
}

// =============================================================================
// ERROR COLLABORATORS
// =============================================================================

/// Which optional attributes an [`ErrorAttributes`] implementation includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorAttributeOptions {
    pub include_exception: bool,
    pub include_message: bool,
    pub include_binding_errors: bool,
}

impl ErrorAttributeOptions {
    pub fn all() -> Self {
        Self {
            include_exception: true,
            include_message: true,
            include_binding_errors: true,
        }
    }
}

impl Default for ErrorAttributeOptions {
    fn default() -> Self {
        Self {
            include_exception: false,
            include_message: true,
            include_binding_errors: false,
        }
    }
}

/// Derives the error-detail map for a failed or non-2xx response
pub trait ErrorAttributes: Send + Sync {
    fn error_attributes(
        &self,
        response: &ResponseView<'_>,
        options: &ErrorAttributeOptions,
    ) -> ErrorDetail;
}

/// Reset response handed to exception resolvers
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BytesMut,
}

impl ErrorResponse {
    /// Structured error content type forced before resolvers run
    pub const CONTENT_TYPE: &'static str = "application/json;charset=UTF-8";

    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static(Self::CONTENT_TYPE),
        );
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers,
            body: BytesMut::new(),
        }
    }

    /// Discard any partially written content
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for ErrorResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of an exception resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Error content was written; later resolvers are skipped
    Handled,
    /// Let the next resolver act
    NotHandled,
}

/// Produces user-visible error content for a handler failure
pub trait ExceptionResolver: PluginInfo + Send + Sync {
    fn resolve(
        &self,
        exchange: &Exchange,
        failure: &HandlerFailure,
        response: &mut ErrorResponse,
    ) -> Resolution;
}
