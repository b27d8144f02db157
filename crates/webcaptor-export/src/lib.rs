//! Event sinks for webcaptor

#[cfg(feature = "jsonl")]
pub mod jsonl;
pub mod log;
pub mod memory;

#[cfg(feature = "jsonl")]
pub use jsonl::{JsonlSink, JsonlSinkConfig};
pub use log::TracingSink;
pub use memory::MemorySink;
