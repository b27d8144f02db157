//! User-Agent enrichment

use async_trait::async_trait;
use http::header::USER_AGENT;
use serde_json::Value;
use webcaptor_core::plugins::{EventEnricher, ExtensionData, PluginInfo, PluginResult};
use webcaptor_core::{Exchange, RequestEvent, ResponseEvent};

/// Adds `user_agent` to request and response events, `Unknown` when the
/// header is missing
#[derive(Debug, Default)]
pub struct UserAgentEnricher;

impl UserAgentEnricher {
    pub fn new() -> Self {
        Self
    }
}

impl PluginInfo for UserAgentEnricher {
    fn name(&self) -> &str {
        "user-agent-enricher"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Adds the User-Agent header to request and response events"
    }
}

#[async_trait]
impl EventEnricher for UserAgentEnricher {
    async fn enrich_request(
        &self,
        exchange: &Exchange,
        _request: &RequestEvent,
    ) -> PluginResult<ExtensionData> {
        Ok(user_agent(exchange))
    }

    async fn enrich_response(
        &self,
        exchange: &Exchange,
        _request: &RequestEvent,
        _response: &ResponseEvent,
    ) -> PluginResult<ExtensionData> {
        Ok(user_agent(exchange))
    }
}

fn user_agent(exchange: &Exchange) -> ExtensionData {
    let user_agent = exchange
        .request()
        .headers
        .get(USER_AGENT)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let mut data = ExtensionData::new();
    data.insert("user_agent".into(), Value::String(user_agent));
    data
}
