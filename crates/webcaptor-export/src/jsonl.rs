//! JSONL file sink

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{error, info};
use webcaptor_core::plugins::{EventSink, PluginError, PluginInfo, PluginResult};
use webcaptor_core::CaptureEvent;

/// JSONL sink configuration
#[derive(Debug, Clone)]
pub struct JsonlSinkConfig {
    /// Output file path
    pub path: PathBuf,

    /// Whether to append to existing file
    pub append: bool,

    /// Pretty print JSON (not recommended for large files)
    pub pretty: bool,

    /// Flush after each write
    pub flush_each: bool,
}

impl Default for JsonlSinkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("webcaptor-events.jsonl"),
            append: true,
            pretty: false,
            flush_each: true,
        }
    }
}

/// Writes one JSON document per captured event
pub struct JsonlSink {
    config: JsonlSinkConfig,
    writer: Mutex<BufWriter<File>>,
    events_written: AtomicU64,
}

impl JsonlSink {
    /// Open (or create) the output file
    pub fn new(config: JsonlSinkConfig) -> PluginResult<Self> {
        let file = if config.append {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.path)?
        } else {
            File::create(&config.path)?
        };
        info!("JSONL sink writing to: {:?}", config.path);

        Ok(Self {
            config,
            writer: Mutex::new(BufWriter::new(file)),
            events_written: AtomicU64::new(0),
        })
    }

    pub fn events_written(&self) -> u64 {
        self.events_written.load(Ordering::Relaxed)
    }

    fn write(&self, event: &CaptureEvent) -> PluginResult<()> {
        let json = if self.config.pretty {
            serde_json::to_string_pretty(event)?
        } else {
            serde_json::to_string(event)?
        };

        let mut w = self
            .writer
            .lock()
            .map_err(|e| PluginError::OperationFailed(format!("Lock poisoned: {}", e)))?;
        writeln!(w, "{}", json)?;
        if self.config.flush_each {
            w.flush()?;
        }

        self.events_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl PluginInfo for JsonlSink {
    fn name(&self) -> &str {
        "jsonl-sink"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Writes events to JSONL files"
    }
}

impl EventSink for JsonlSink {
    fn publish(&self, event: CaptureEvent) {
        if let Err(e) = self.write(&event) {
            error!(
                "Failed to write {} event to {:?}: {}",
                event.event_type(),
                self.config.path,
                e
            );
        }
    }

    fn flush(&self) {
        match self.writer.lock() {
            Ok(mut w) => {
                if let Err(e) = w.flush() {
                    error!("Failed to flush {:?}: {}", self.config.path, e);
                }
            }
            Err(e) => error!("Failed to flush {:?}: lock poisoned: {}", self.config.path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_events;

    #[test]
    fn test_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = JsonlSink::new(JsonlSinkConfig {
            path: path.clone(),
            ..Default::default()
        })
        .unwrap();

        let (request, response) = sample_events();
        sink.publish(request);
        sink.publish(response);
        sink.flush();
        assert_eq!(sink.events_written(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event_type"], "http.request");
        assert_eq!(lines[1]["event_type"], "http.response");
        assert_eq!(lines[1]["data"]["status"], 200);
        assert_eq!(lines[1]["data"]["request"]["path"], "/hello");
    }

    #[test]
    fn test_truncates_when_not_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "stale\n").unwrap();

        let sink = JsonlSink::new(JsonlSinkConfig {
            path: path.clone(),
            append: false,
            ..Default::default()
        })
        .unwrap();
        sink.publish(sample_events().0);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("stale"));
        assert_eq!(content.lines().count(), 1);
    }
}
