//! Client IP enrichment

use async_trait::async_trait;
use serde_json::Value;
use std::net::IpAddr;
use tracing::trace;
use webcaptor_core::plugins::{EventEnricher, ExtensionData, PluginInfo, PluginResult};
use webcaptor_core::{Exchange, RequestEvent, ResponseEvent};

/// Headers consulted in order, before falling back to the peer address
pub const CLIENT_IP_HEADERS: &[&str] = &[
    "X-Forwarded-For",
    "Proxy-Client-IP",
    "WL-Proxy-Client-IP",
    "HTTP_X_FORWARDED_FOR",
    "HTTP_X_FORWARDED",
    "HTTP_X_CLUSTER_CLIENT_IP",
    "HTTP_CLIENT_IP",
    "HTTP_FORWARDED_FOR",
    "HTTP_FORWARDED",
    "HTTP_VIA",
    "REMOTE_ADDR",
    "X-Real-IP",
];

const UNKNOWN_ADDRESS: &str = "0.0.0.0";
const LOOPBACK_V4: &str = "127.0.0.1";

/// Adds `user_ip` to request and response events
#[derive(Debug, Default)]
pub struct ClientIpEnricher;

impl ClientIpEnricher {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the client address of an exchange
    pub fn resolve(exchange: &Exchange) -> String {
        let request = exchange.request();
        let forwarded = CLIENT_IP_HEADERS.iter().find_map(|name| {
            let value = request.header(name)?;
            let first = value.split(',').next()?.trim();
            if first.is_empty() || first.eq_ignore_ascii_case("unknown") {
                None
            } else {
                trace!(header = *name, address = first, "Client IP from header");
                Some(first.to_string())
            }
        });

        let address = forwarded
            .or_else(|| request.remote_addr.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string());
        normalize_loopback(address)
    }
}

fn normalize_loopback(address: String) -> String {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) if v6.is_loopback() => LOOPBACK_V4.to_string(),
        _ => address,
    }
}

impl PluginInfo for ClientIpEnricher {
    fn name(&self) -> &str {
        "client-ip-enricher"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Adds the resolved client IP to request and response events"
    }
}

#[async_trait]
impl EventEnricher for ClientIpEnricher {
    async fn enrich_request(
        &self,
        exchange: &Exchange,
        _request: &RequestEvent,
    ) -> PluginResult<ExtensionData> {
        Ok(user_ip(exchange))
    }

    async fn enrich_response(
        &self,
        exchange: &Exchange,
        _request: &RequestEvent,
        _response: &ResponseEvent,
    ) -> PluginResult<ExtensionData> {
        Ok(user_ip(exchange))
    }
}

fn user_ip(exchange: &Exchange) -> ExtensionData {
    let mut data = ExtensionData::new();
    data.insert("user_ip".into(), Value::String(ClientIpEnricher::resolve(exchange)));
    data
}
