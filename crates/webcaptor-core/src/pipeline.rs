//! Capture pipeline - publish-once orchestration from capture to sink
//!
//! Each exchange publishes at most one request event and one response event,
//! no matter how many trigger points fire. The request event is memoized on the
//! exchange, so every trigger and the response event share the same snapshot.

use crate::config::CaptorConfig;
use crate::events::{CaptureEvent, RequestEvent, RequestEventBuilder, ResponseEvent, ResponseEventBuilder};
use crate::exchange::{Exchange, ResponseView};
use crate::exclusion::ExclusionRules;
use crate::plugins::{EventEnricher, EventSink, RequestPublishCondition, ResponsePublishCondition};
use crate::promise::ResponseBody;
use crate::registry::{CaptorRegistry, DecoderRegistry};
use futures_util::FutureExt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Pipeline counters
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub requests_published: AtomicU64,
    pub responses_published: AtomicU64,
    /// Responses dropped because the body never resolved
    pub responses_omitted: AtomicU64,
    /// Requests skipped by the master switch or an exclusion rule
    pub requests_skipped: AtomicU64,
    /// Events withheld by a publish condition
    pub requests_suppressed: AtomicU64,
    pub responses_suppressed: AtomicU64,
}

impl PipelineStats {
    pub fn requests_published(&self) -> u64 {
        self.requests_published.load(Ordering::Relaxed)
    }

    pub fn responses_published(&self) -> u64 {
        self.responses_published.load(Ordering::Relaxed)
    }

    pub fn responses_omitted(&self) -> u64 {
        self.responses_omitted.load(Ordering::Relaxed)
    }

    pub fn requests_skipped(&self) -> u64 {
        self.requests_skipped.load(Ordering::Relaxed)
    }

    pub fn requests_suppressed(&self) -> u64 {
        self.requests_suppressed.load(Ordering::Relaxed)
    }

    pub fn responses_suppressed(&self) -> u64 {
        self.responses_suppressed.load(Ordering::Relaxed)
    }
}

/// The capture pipeline
pub struct CapturePipeline {
    config: Arc<CaptorConfig>,

    /// Decoders for response bodies
    decoders: Arc<DecoderRegistry>,

    /// Request and response field captors
    captors: CaptorRegistry,

    enrichers: Vec<Box<dyn EventEnricher>>,

    sinks: Vec<Arc<dyn EventSink>>,

    exclusions: Arc<ExclusionRules>,

    request_conditions: Vec<Arc<dyn RequestPublishCondition>>,

    response_conditions: Vec<Arc<dyn ResponsePublishCondition>>,

    /// Broadcast channel for events (for live subscribers)
    event_broadcast: broadcast::Sender<CaptureEvent>,

    stats: PipelineStats,
}

impl CapturePipeline {
    pub fn new(config: CaptorConfig, decoders: Arc<DecoderRegistry>, captors: CaptorRegistry) -> Self {
        let (event_broadcast, _) = broadcast::channel(config.captor.event_buffer_size.max(1));
        let exclusions = Arc::new(ExclusionRules::from_config(&config.excluded_endpoints));

        Self {
            config: Arc::new(config),
            decoders,
            captors,
            enrichers: Vec::new(),
            sinks: Vec::new(),
            request_conditions: vec![exclusions.clone()],
            response_conditions: vec![exclusions.clone()],
            exclusions,
            event_broadcast,
            stats: PipelineStats::default(),
        }
    }

    /// Add an enricher
    pub fn add_enricher(&mut self, enricher: Box<dyn EventEnricher>) {
        self.enrichers.push(enricher);
    }

    /// Add a condition every request event must pass before publication
    pub fn add_request_condition(&mut self, condition: Arc<dyn RequestPublishCondition>) {
        self.request_conditions.push(condition);
    }

    /// Add a condition every response event must pass before publication
    pub fn add_response_condition(&mut self, condition: Arc<dyn ResponsePublishCondition>) {
        self.response_conditions.push(condition);
    }

    /// Add a sink
    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn config(&self) -> &CaptorConfig {
        &self.config
    }

    pub fn decoders(&self) -> &Arc<DecoderRegistry> {
        &self.decoders
    }

    pub fn captors(&self) -> &CaptorRegistry {
        &self.captors
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Subscribe to event broadcast
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.event_broadcast.subscribe()
    }

    /// Get the event broadcast sender
    pub fn event_sender(&self) -> broadcast::Sender<CaptureEvent> {
        self.event_broadcast.clone()
    }

    /// Whether a request should be captured at all. Evaluated before any
    /// capture work is done.
    pub fn should_capture(&self, method: &http::Method, path: &str) -> bool {
        let capture = self.config.captor.enabled
            && !self.exclusions.is_excluded(method.into(), path);
        if !capture {
            self.stats.requests_skipped.fetch_add(1, Ordering::Relaxed);
        }
        capture
    }

    /// Whether a response with this content type is streamed through
    pub fn is_streaming(&self, content_type: &str) -> bool {
        self.config.response.is_streaming(content_type)
    }

    /// Most bytes of a body kept for capture
    pub fn max_body_bytes(&self) -> usize {
        self.config.event_details.max_body_bytes
    }

    /// Memoized request event: built, enriched and cached on first call
    pub async fn request_event(&self, exchange: &Exchange) -> Arc<RequestEvent> {
        exchange
            .request_event
            .get_or_init(|| self.build_request_event(exchange))
            .await
            .clone()
    }

    async fn build_request_event(&self, exchange: &Exchange) -> Arc<RequestEvent> {
        let mut builder = RequestEventBuilder::new(exchange.id());
        self.captors.capture_request(exchange, &mut builder);
        let mut event = builder.build();

        for enricher in &self.enrichers {
            let result = AssertUnwindSafe(enricher.enrich_request(exchange, &event))
                .catch_unwind()
                .await;
            match result {
                Ok(Ok(data)) => event.extend_additional_data(data),
                Ok(Err(e)) => warn!("Enricher {} failed on request: {}", enricher.name(), e),
                Err(_) => warn!("Enricher {} panicked on request", enricher.name()),
            }
        }

        Arc::new(event)
    }

    /// Publish the request event unless it was already published.
    /// Returns true if this call published it.
    pub async fn publish_request(&self, exchange: &Exchange) -> bool {
        if !exchange.claim_request_publish() {
            return false;
        }
        if !self.request_allowed(exchange) {
            debug!("Request event for exchange {} suppressed", exchange.id());
            self.stats.requests_suppressed.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let event = self.request_event(exchange).await;
        debug!(
            "Publishing request event {} (endpoint exists: {})",
            event.id,
            exchange.endpoint_exists()
        );
        self.stats.requests_published.fetch_add(1, Ordering::Relaxed);
        self.emit(CaptureEvent::Request(event));
        true
    }

    /// Wait for the response body, then publish the response event unless it
    /// was already published. If the body never resolves (timeout or
    /// abandoned stream) nothing is published. Returns true if this call
    /// published the event.
    pub async fn publish_response(&self, exchange: &Exchange) -> bool {
        if !exchange.claim_response_publish() {
            return false;
        }

        let request = self.request_event(exchange).await;
        let timeout = Duration::from_millis(self.config.response.async_timeout_ms);
        let body = match tokio::time::timeout(timeout, exchange.response_body(&self.decoders)).await {
            Ok(ResponseBody::Abandoned) => {
                warn!(
                    "Response body for {} {} was abandoned; no response event published",
                    exchange.request().method,
                    exchange.request().path()
                );
                self.stats.responses_omitted.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            Ok(body) => body,
            Err(_) => {
                exchange.body_promise().close();
                warn!(
                    "Response body for {} {} timed out after {:?}; no response event published",
                    exchange.request().method,
                    exchange.request().path(),
                    timeout
                );
                self.stats.responses_omitted.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        if !self.response_allowed(&ResponseView::new(exchange, &body)) {
            debug!("Response event for exchange {} suppressed", exchange.id());
            self.stats.responses_suppressed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let event = exchange
            .response_event
            .get_or_init(|| self.build_response_event(exchange, request, &body))
            .await
            .clone();

        debug!("Publishing response event {} (status: {:?})", event.id, event.status);
        self.stats.responses_published.fetch_add(1, Ordering::Relaxed);
        self.emit(CaptureEvent::Response(event));
        true
    }

    async fn build_response_event(
        &self,
        exchange: &Exchange,
        request: Arc<RequestEvent>,
        body: &ResponseBody,
    ) -> Arc<ResponseEvent> {
        let view = ResponseView::new(exchange, body);
        let mut builder = ResponseEventBuilder::new(exchange.id(), request.clone());
        self.captors.capture_response(&view, &mut builder);
        let mut event = builder.build();

        for enricher in &self.enrichers {
            let result = AssertUnwindSafe(enricher.enrich_response(exchange, &request, &event))
                .catch_unwind()
                .await;
            match result {
                Ok(Ok(data)) => event.extend_additional_data(data),
                Ok(Err(e)) => warn!("Enricher {} failed on response: {}", enricher.name(), e),
                Err(_) => warn!("Enricher {} panicked on response", enricher.name()),
            }
        }

        Arc::new(event)
    }

    fn request_allowed(&self, exchange: &Exchange) -> bool {
        self.request_conditions.iter().all(|condition| {
            catch_unwind(AssertUnwindSafe(|| condition.should_publish_request(exchange)))
                .unwrap_or_else(|_| {
                    warn!("Publish condition {} panicked on request", condition.name());
                    true
                })
        })
    }

    fn response_allowed(&self, view: &ResponseView<'_>) -> bool {
        self.response_conditions.iter().all(|condition| {
            catch_unwind(AssertUnwindSafe(|| condition.should_publish_response(view)))
                .unwrap_or_else(|_| {
                    warn!("Publish condition {} panicked on response", condition.name());
                    true
                })
        })
    }

    /// Hand an event to every sink and the broadcast channel
    fn emit(&self, event: CaptureEvent) {
        for sink in &self.sinks {
            let sink_event = event.clone();
            if catch_unwind(AssertUnwindSafe(|| sink.publish(sink_event))).is_err() {
                warn!("Sink {} panicked", sink.name());
            }
        }
        // No subscribers is fine
        let _ = self.event_broadcast.send(event);
    }

    /// Flush all sinks
    pub fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}
