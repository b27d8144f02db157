//! webcaptor core - event types, plugin traits, and the capture pipeline
//!
//! This crate provides the foundational types and abstractions for webcaptor:
//!
//! - **Events**: immutable request/response snapshots handed to sinks
//! - **Plugins**: trait definitions for decoders, captors, enrichers and sinks
//! - **Registries**: ordered decoder and field-captor lists
//! - **Publish conditions**: per-event filters, endpoint exclusion built in
//! - **Exchange**: per-request capture state (buffers, memoized events, publish flags)
//! - **Pipeline**: publish-once orchestration from capture to sink

pub mod config;
pub mod content_type;
pub mod events;
pub mod exchange;
pub mod exclusion;
pub mod failure;
pub mod pipeline;
pub mod plugins;
pub mod promise;
pub mod registry;

// Re-export commonly used types
pub use content_type::ContentType;
pub use events::{
    AttachedFile, BodyPayload, CaptureEvent, HttpMethod, MultiValueMap, RequestEvent,
    RequestEventBuilder, ResponseEvent, ResponseEventBuilder,
};
pub use exchange::{Exchange, RequestSnapshot, ResponseHead, ResponseView, RouteMatch};
pub use failure::{FailureKind, HandlerFailure};
pub use pipeline::{CapturePipeline, PipelineStats};
pub use plugins::{
    BodyDecoder, DecodeError, ErrorAttributeOptions, ErrorAttributes, ErrorDetail,
    ErrorResponse, EventEnricher, EventSink, ExceptionResolver, ExtensionData, PluginError,
    PluginInfo, PluginResult, RequestFieldCaptor, RequestPublishCondition, Resolution,
    ResponseFieldCaptor, ResponsePublishCondition,
};
pub use exclusion::ExclusionRules;
pub use promise::{BodyOutcome, BodyPromise, BodyResolver, ResponseBody};
pub use registry::{CaptorRegistry, DecoderRegistry};

/// webcaptor version
pub const WEBCAPTOR_VERSION: &str = env!("CARGO_PKG_VERSION");
