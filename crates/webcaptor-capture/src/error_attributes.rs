//! Default error-attribute collaborator

use chrono::{SecondsFormat, Utc};
use http::StatusCode;
use serde_json::Value;
use webcaptor_core::plugins::{ErrorAttributeOptions, ErrorAttributes, ErrorDetail};
use webcaptor_core::ResponseView;

/// Builds the standard error-detail map:
///
/// | key         | value                                                    |
/// |-------------|----------------------------------------------------------|
/// | `timestamp` | RFC 3339, millisecond precision                          |
/// | `status`    | response status; 500 for a failure without error status |
/// | `error`     | canonical reason phrase                                  |
/// | `message`   | failure message, JSON body `message`, or reason phrase   |
/// | `path`      | request path                                             |
/// | `exception` | failure type name (optional)                             |
/// | `errors`    | validation sub-errors (optional)                         |
#[derive(Debug, Default, Clone)]
pub struct DefaultErrorAttributes;

impl DefaultErrorAttributes {
    pub fn new() -> Self {
        Self
    }

    fn status(response: &ResponseView<'_>) -> StatusCode {
        match (response.status(), response.failure()) {
            (Some(status), Some(_)) if status.is_success() => StatusCode::INTERNAL_SERVER_ERROR,
            (Some(status), _) => status,
            (None, _) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(response: &ResponseView<'_>, reason: &str) -> String {
        if let Some(failure) = response.failure() {
            return failure.message.clone();
        }
        response
            .body()
            .payload()
            .and_then(|payload| payload.get("message"))
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .unwrap_or(reason)
            .to_string()
    }
}

impl ErrorAttributes for DefaultErrorAttributes {
    fn error_attributes(
        &self,
        response: &ResponseView<'_>,
        options: &ErrorAttributeOptions,
    ) -> ErrorDetail {
        let status = Self::status(response);
        let reason = status.canonical_reason().unwrap_or("Unknown");

        let mut detail = ErrorDetail::new();
        detail.insert(
            "timestamp".into(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        detail.insert("status".into(), Value::from(status.as_u16()));
        detail.insert("error".into(), Value::String(reason.to_string()));
        if options.include_message {
            detail.insert(
                "message".into(),
                Value::String(Self::message(response, reason)),
            );
        }
        detail.insert(
            "path".into(),
            Value::String(response.request().path().to_string()),
        );

        if let Some(failure) = response.failure() {
            if options.include_exception {
                if let Some(exception) = &failure.exception {
                    detail.insert("exception".into(), Value::String(exception.clone()));
                }
            }
            if options.include_binding_errors && !failure.errors.is_empty() {
                detail.insert("errors".into(), Value::Array(failure.errors.clone()));
            }
        }
        detail
    }
}
