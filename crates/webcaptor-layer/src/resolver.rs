//! Default exception resolver

use chrono::{SecondsFormat, Utc};
use http::StatusCode;
use serde_json::json;
use tracing::warn;
use webcaptor_core::plugins::{ErrorResponse, ExceptionResolver, PluginInfo, Resolution};
use webcaptor_core::{Exchange, HandlerFailure};

/// Writes a 500 response with a JSON body:
/// `{"error", "message", "status", "path", "timestamp"}`
#[derive(Debug, Default)]
pub struct JsonExceptionResolver;

impl JsonExceptionResolver {
    pub fn new() -> Self {
        Self
    }
}

impl PluginInfo for JsonExceptionResolver {
    fn name(&self) -> &str {
        "json-exception-resolver"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Renders handler failures as JSON error documents"
    }
}

impl ExceptionResolver for JsonExceptionResolver {
    fn resolve(
        &self,
        exchange: &Exchange,
        failure: &HandlerFailure,
        response: &mut ErrorResponse,
    ) -> Resolution {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let document = json!({
            "error": status.canonical_reason().unwrap_or("Internal Server Error"),
            "message": failure.message,
            "status": status.as_u16(),
            "path": exchange.request().path(),
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        match serde_json::to_vec(&document) {
            Ok(bytes) => {
                response.status = status;
                response.body.extend_from_slice(&bytes);
                Resolution::Handled
            }
            Err(e) => {
                warn!("Failed to render error document: {}", e);
                Resolution::NotHandled
            }
        }
    }
}
