//! Request events

use super::{BodyPayload, HttpMethod, MultiValueMap};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Snapshot of one inbound request.
///
/// Every captured field is optional: `None` means the field was not
/// configured for capture, which is distinct from a captured-but-empty value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestEvent {
    /// Unique event identifier (ULID)
    pub id: String,

    /// Identifier shared by the request and response events of one exchange
    pub exchange_id: String,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Whether routing matched a handler
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_exists: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<MultiValueMap>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_params: Option<MultiValueMap>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_params: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyPayload>,

    /// Data contributed by enrichers
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub additional_data: Map<String, Value>,
}

impl RequestEvent {
    /// Merge enricher output into the extension data
    pub fn extend_additional_data(&mut self, data: Map<String, Value>) {
        self.additional_data.extend(data);
    }
}

/// Assembles a [`RequestEvent`] one field at a time
#[derive(Debug)]
pub struct RequestEventBuilder {
    event: RequestEvent,
}

impl RequestEventBuilder {
    pub fn new(exchange_id: impl Into<String>) -> Self {
        Self {
            event: RequestEvent {
                id: ulid::Ulid::new().to_string(),
                exchange_id: exchange_id.into(),
                timestamp: Utc::now(),
                endpoint_exists: None,
                full_url: None,
                path: None,
                method: None,
                headers: None,
                query_params: None,
                path_params: None,
                body: None,
                additional_data: Map::new(),
            },
        }
    }

    pub fn endpoint_exists(&mut self, exists: bool) -> &mut Self {
        self.event.endpoint_exists = Some(exists);
        self
    }

    pub fn full_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.event.full_url = Some(url.into());
        self
    }

    pub fn path(&mut self, path: impl Into<String>) -> &mut Self {
        self.event.path = Some(path.into());
        self
    }

    pub fn method(&mut self, method: HttpMethod) -> &mut Self {
        self.event.method = Some(method);
        self
    }

    pub fn headers(&mut self, headers: MultiValueMap) -> &mut Self {
        self.event.headers = Some(headers);
        self
    }

    pub fn query_params(&mut self, params: MultiValueMap) -> &mut Self {
        self.event.query_params = Some(params);
        self
    }

    pub fn path_params(&mut self, params: BTreeMap<String, String>) -> &mut Self {
        self.event.path_params = Some(params);
        self
    }

    pub fn body(&mut self, body: BodyPayload) -> &mut Self {
        self.event.body = Some(body);
        self
    }

    pub fn build(self) -> RequestEvent {
        self.event
    }
}
