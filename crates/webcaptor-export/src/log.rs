//! Sink that writes events to the tracing log

use tracing::{info, warn};
use webcaptor_core::plugins::{EventSink, PluginInfo};
use webcaptor_core::CaptureEvent;

/// Logs each event as a JSON document at `info` level
#[derive(Debug, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl PluginInfo for TracingSink {
    fn name(&self) -> &str {
        "tracing-sink"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Logs events through tracing"
    }
}

impl EventSink for TracingSink {
    fn publish(&self, event: CaptureEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => info!(
                target: "webcaptor::events",
                event_type = event.event_type(),
                exchange_id = event.exchange_id(),
                "{}",
                json
            ),
            Err(e) => warn!("Failed to serialize {} event: {}", event.event_type(), e),
        }
    }
}
