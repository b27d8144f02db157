//! Enrichment plugins for webcaptor
//!
//! Enrichers add supplementary data to the `additional_data` map of assembled
//! events. Each built-in is toggled under `[additional_details]`.

pub mod client_ip;
pub mod duration;
pub mod user_agent;

pub use client_ip::ClientIpEnricher;
pub use duration::DurationEnricher;
pub use user_agent::UserAgentEnricher;

use webcaptor_core::config::CaptorConfig;
use tracing::debug;
use webcaptor_core::plugins::EventEnricher;

/// Enrichers enabled by the configuration
pub fn default_enrichers(config: &CaptorConfig) -> Vec<Box<dyn EventEnricher>> {
    let details = &config.additional_details;
    let mut enrichers: Vec<Box<dyn EventEnricher>> = Vec::new();
    if details.duration {
        enrichers.push(Box::new(DurationEnricher::new()));
    }
    if details.ip_address {
        enrichers.push(Box::new(ClientIpEnricher::new()));
    }
    if details.user_agent {
        enrichers.push(Box::new(UserAgentEnricher::new()));
    }
    debug!("Enabled {} enrichers", enrichers.len());
    enrichers
}
