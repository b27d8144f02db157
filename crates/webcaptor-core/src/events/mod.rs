//! Capture event types
//!
//! A request produces one [`RequestEvent`] and one [`ResponseEvent`]. Both are
//! immutable once handed to a sink; the response embeds the request snapshot.

pub mod body;
pub mod method;
pub mod multimap;
pub mod request;
pub mod response;

pub use body::*;
pub use method::*;
pub use multimap::*;
pub use request::*;
pub use response::*;

use serde::Serialize;
use std::sync::Arc;

/// Unit handed to event sinks
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", content = "data")]
pub enum CaptureEvent {
    #[serde(rename = "http.request")]
    Request(Arc<RequestEvent>),

    #[serde(rename = "http.response")]
    Response(Arc<ResponseEvent>),
}

impl CaptureEvent {
    /// Get the event type string
    pub fn event_type(&self) -> &'static str {
        match self {
            CaptureEvent::Request(_) => "http.request",
            CaptureEvent::Response(_) => "http.response",
        }
    }

    /// Exchange (request/response pair) this event belongs to
    pub fn exchange_id(&self) -> &str {
        match self {
            CaptureEvent::Request(e) => &e.exchange_id,
            CaptureEvent::Response(e) => &e.exchange_id,
        }
    }

    pub fn as_request(&self) -> Option<&Arc<RequestEvent>> {
        match self {
            CaptureEvent::Request(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&Arc<ResponseEvent>> {
        match self {
            CaptureEvent::Response(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_event_serialization() {
        let mut builder = RequestEventBuilder::new("01HEXCHANGE");
        builder.path("/users/7").method(HttpMethod::Get);
        let event = CaptureEvent::Request(Arc::new(builder.build()));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "http.request");
        assert_eq!(json["data"]["path"], "/users/7");
        assert_eq!(json["data"]["method"], "GET");
        assert_eq!(json["data"]["exchange_id"], "01HEXCHANGE");
        // Fields that were never captured are omitted, not null
        assert!(json["data"].get("headers").is_none());
        assert!(json["data"].get("body").is_none());
    }

    #[test]
    fn test_response_event_type() {
        let request = Arc::new(RequestEventBuilder::new("01HEXCHANGE").build());
        let mut builder = ResponseEventBuilder::new("01HEXCHANGE", request);
        builder.status(204);
        let event = CaptureEvent::Response(Arc::new(builder.build()));

        assert_eq!(event.event_type(), "http.response");
        assert_eq!(event.exchange_id(), "01HEXCHANGE");
        assert!(event.as_request().is_none());
        assert_eq!(event.as_response().unwrap().status, Some(204));
    }
}
