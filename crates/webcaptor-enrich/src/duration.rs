//! Request duration enrichment

use async_trait::async_trait;
use serde_json::Value;
use webcaptor_core::plugins::{EventEnricher, ExtensionData, PluginInfo, PluginResult};
use webcaptor_core::{Exchange, RequestEvent, ResponseEvent};

/// Adds `duration_ms`, `start_time` and `end_time` (epoch millis) to the
/// response event. The delta comes from the monotonic clock, so
/// `end_time - start_time == duration_ms` even if the wall clock moves.
#[derive(Debug, Default)]
pub struct DurationEnricher;

impl DurationEnricher {
    pub fn new() -> Self {
        Self
    }
}

impl PluginInfo for DurationEnricher {
    fn name(&self) -> &str {
        "duration-enricher"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Adds request processing time to response events"
    }
}

#[async_trait]
impl EventEnricher for DurationEnricher {
    async fn enrich_response(
        &self,
        exchange: &Exchange,
        _request: &RequestEvent,
        _response: &ResponseEvent,
    ) -> PluginResult<ExtensionData> {
        let start = exchange.started_at().timestamp_millis();
        let duration = i64::try_from(exchange.elapsed().as_millis()).unwrap_or(i64::MAX);

        let mut data = ExtensionData::new();
        data.insert("duration_ms".into(), Value::from(duration));
        data.insert("start_time".into(), Value::from(start));
        data.insert("end_time".into(), Value::from(start.saturating_add(duration)));
        Ok(data)
    }
}
