//! In-memory sink

use parking_lot::Mutex;
use std::sync::Arc;
use webcaptor_core::plugins::{EventSink, PluginInfo};
use webcaptor_core::{CaptureEvent, RequestEvent, ResponseEvent};

/// Keeps every published event in memory. Intended for tests and embedding
/// applications that inspect captures directly.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<CaptureEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events in publish order
    pub fn events(&self) -> Vec<CaptureEvent> {
        self.events.lock().clone()
    }

    pub fn requests(&self) -> Vec<Arc<RequestEvent>> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.as_request().cloned())
            .collect()
    }

    pub fn responses(&self) -> Vec<Arc<ResponseEvent>> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.as_response().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl PluginInfo for MemorySink {
    fn name(&self) -> &str {
        "memory-sink"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Collects events in memory"
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: CaptureEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_events;

    #[test]
    fn test_split_by_kind() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());

        let (request, response) = sample_events();
        sink.publish(request);
        sink.publish(response);

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.requests().len(), 1);
        assert_eq!(sink.responses().len(), 1);
        assert!(Arc::ptr_eq(
            &sink.requests()[0],
            &sink.responses()[0].request
        ));

        sink.clear();
        assert!(sink.is_empty());
    }
}
