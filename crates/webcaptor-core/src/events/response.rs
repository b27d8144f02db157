//! Response events

use super::{MultiValueMap, RequestEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Snapshot of one response, embedding the already-published request snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEvent {
    /// Unique event identifier (ULID)
    pub id: String,

    /// Identifier shared with the request event
    pub exchange_id: String,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// The request this response answers
    pub request: Arc<RequestEvent>,

    /// Final status code. Absent when capture is disabled or an unhandled
    /// failure happened before a status was determined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<MultiValueMap>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Error attributes for error responses and handler failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<Map<String, Value>>,

    /// Data contributed by enrichers
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub additional_data: Map<String, Value>,
}

impl ResponseEvent {
    /// Attach error detail; the body becomes a text node holding the message
    pub fn add_error_detail(&mut self, detail: Map<String, Value>) {
        let message = match detail.get("message") {
            Some(Value::String(s)) => Value::String(s.clone()),
            Some(Value::Null) | None => Value::Null,
            Some(other) => Value::String(other.to_string()),
        };
        self.body = Some(message);
        self.error_detail = Some(detail);
    }

    /// Status is 4xx or 5xx
    pub fn is_error_response(&self) -> bool {
        self.is_client_error() || self.is_server_error()
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.status, Some(400..=499))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status, Some(500..=599))
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }

    pub fn extend_additional_data(&mut self, data: Map<String, Value>) {
        self.additional_data.extend(data);
    }
}

/// Assembles a [`ResponseEvent`] one field at a time
#[derive(Debug)]
pub struct ResponseEventBuilder {
    event: ResponseEvent,
}

impl ResponseEventBuilder {
    pub fn new(exchange_id: impl Into<String>, request: Arc<RequestEvent>) -> Self {
        Self {
            event: ResponseEvent {
                id: ulid::Ulid::new().to_string(),
                exchange_id: exchange_id.into(),
                timestamp: Utc::now(),
                request,
                status: None,
                headers: None,
                body: None,
                error_detail: None,
                additional_data: Map::new(),
            },
        }
    }

    pub fn status(&mut self, status: u16) -> &mut Self {
        self.event.status = Some(status);
        self
    }

    pub fn headers(&mut self, headers: MultiValueMap) -> &mut Self {
        self.event.headers = Some(headers);
        self
    }

    pub fn body(&mut self, body: Value) -> &mut Self {
        self.event.body = Some(body);
        self
    }

    /// See [`ResponseEvent::add_error_detail`]
    pub fn error_detail(&mut self, detail: Map<String, Value>) -> &mut Self {
        self.event.add_error_detail(detail);
        self
    }

    pub fn build(self) -> ResponseEvent {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RequestEventBuilder;
    use serde_json::json;

    fn response(status: Option<u16>) -> ResponseEvent {
        let request = Arc::new(RequestEventBuilder::new("ex").build());
        let mut builder = ResponseEventBuilder::new("ex", request);
        if let Some(status) = status {
            builder.status(status);
        }
        builder.build()
    }

    #[test]
    fn test_status_classes() {
        assert!(response(Some(404)).is_client_error());
        assert!(response(Some(404)).is_error_response());
        assert!(response(Some(503)).is_server_error());
        assert!(response(Some(201)).is_success());
        assert!(!response(Some(302)).is_error_response());
        assert!(!response(None).is_error_response());
    }

    #[test]
    fn test_error_detail_rewrites_body() {
        let mut event = response(Some(500));
        event.body = Some(json!({ "ok": false }));

        let mut detail = Map::new();
        detail.insert("status".into(), json!(500));
        detail.insert("message".into(), json!("boom"));
        event.add_error_detail(detail);

        assert_eq!(event.body, Some(json!("boom")));
        assert_eq!(event.error_detail.unwrap()["status"], 500);
    }

    #[test]
    fn test_embeds_request() {
        let mut request = RequestEventBuilder::new("ex");
        request.path("/a");
        let request = Arc::new(request.build());
        let event = ResponseEventBuilder::new("ex", request.clone()).build();

        assert!(Arc::ptr_eq(&event.request, &request));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["request"]["path"], "/a");
    }
}
