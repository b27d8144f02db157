//! Decoder and field-captor registries
//!
//! Both registries are built once at startup and shared by reference. Entries
//! are kept in ascending priority; ties keep registration order.

use crate::content_type::ContentType;
use crate::events::{BodyPayload, RequestEventBuilder, ResponseEventBuilder};
use crate::exchange::{Exchange, ResponseView};
use crate::plugins::{BodyDecoder, DecodeError, RequestFieldCaptor, ResponseFieldCaptor};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// Ordered set of body decoders
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn BodyDecoder>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, decoder: Box<dyn BodyDecoder>) {
        self.decoders.push(decoder);
        // Stable sort: equal priorities keep registration order
        self.decoders.sort_by_key(|d| d.priority());
    }

    pub fn names(&self) -> Vec<&str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode with the first decoder that supports the content type and
    /// succeeds. Failures fall through to the next decoder.
    pub fn decode(
        &self,
        content_type: Option<&ContentType>,
        bytes: &[u8],
    ) -> Result<BodyPayload, DecodeError> {
        for decoder in &self.decoders {
            if !decoder.supports(content_type) {
                continue;
            }
            match decoder.decode(content_type, bytes) {
                Ok(payload) => {
                    debug!("Decoded {} byte body with {}", bytes.len(), decoder.name());
                    return Ok(payload);
                }
                Err(e) => {
                    warn!("Decoder {} failed: {}", decoder.name(), e);
                }
            }
        }
        Err(DecodeError::NoDecoder(content_type.map(|c| c.to_string())))
    }
}

/// Ordered request-side and response-side field captors
#[derive(Default)]
pub struct CaptorRegistry {
    request: Vec<Box<dyn RequestFieldCaptor>>,
    response: Vec<Box<dyn ResponseFieldCaptor>>,
}

impl CaptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_request(&mut self, captor: Box<dyn RequestFieldCaptor>) {
        self.request.push(captor);
        self.request.sort_by_key(|c| c.priority());
    }

    pub fn register_response(&mut self, captor: Box<dyn ResponseFieldCaptor>) {
        self.response.push(captor);
        self.response.sort_by_key(|c| c.priority());
    }

    pub fn request_captors(&self) -> Vec<&str> {
        self.request.iter().map(|c| c.name()).collect()
    }

    pub fn response_captors(&self) -> Vec<&str> {
        self.response.iter().map(|c| c.name()).collect()
    }

    /// Run every request captor. A failing or panicking captor is skipped.
    pub fn capture_request(&self, exchange: &Exchange, event: &mut RequestEventBuilder) {
        for captor in &self.request {
            match catch_unwind(AssertUnwindSafe(|| captor.capture(exchange, event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Request captor {} failed: {}", captor.name(), e),
                Err(_) => warn!("Request captor {} panicked", captor.name()),
            }
        }
    }

    /// Run every response captor. A failing or panicking captor is skipped.
    pub fn capture_response(&self, response: &ResponseView<'_>, event: &mut ResponseEventBuilder) {
        for captor in &self.response {
            match catch_unwind(AssertUnwindSafe(|| captor.capture(response, event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Response captor {} failed: {}", captor.name(), e),
                Err(_) => warn!("Response captor {} panicked", captor.name()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::tests::snapshot;
    use crate::plugins::{PluginError, PluginInfo, PluginResult};
    use http::Method;
    use serde_json::json;

    struct FixedDecoder {
        name: &'static str,
        priority: i32,
        fail: bool,
    }

    impl PluginInfo for FixedDecoder {
        fn name(&self) -> &str {
            self.name
        }

        fn version(&self) -> &str {
            "test"
        }
    }

    impl BodyDecoder for FixedDecoder {
        fn priority(&self) -> i32 {
            self.priority
        }

        fn supports(&self, _content_type: Option<&ContentType>) -> bool {
            true
        }

        fn decode(
            &self,
            content_type: Option<&ContentType>,
            _bytes: &[u8],
        ) -> Result<BodyPayload, DecodeError> {
            if self.fail {
                Err(DecodeError::malformed(content_type, "nope"))
            } else {
                Ok(BodyPayload::text(self.name))
            }
        }
    }

    fn decoder(name: &'static str, priority: i32, fail: bool) -> Box<dyn BodyDecoder> {
        Box::new(FixedDecoder {
            name,
            priority,
            fail,
        })
    }

    #[test]
    fn test_priority_then_registration_order() {
        let mut registry = DecoderRegistry::new();
        registry.register(decoder("late", 10, false));
        registry.register(decoder("first-tie", 1, false));
        registry.register(decoder("second-tie", 1, false));
        assert_eq!(registry.names(), vec!["first-tie", "second-tie", "late"]);

        let payload = registry.decode(None, b"x").unwrap();
        assert_eq!(payload.body, json!("first-tie"));
    }

    #[test]
    fn test_failure_falls_through() {
        let mut registry = DecoderRegistry::new();
        registry.register(decoder("broken", 1, true));
        registry.register(decoder("fallback", i32::MAX, false));

        let payload = registry.decode(None, b"x").unwrap();
        assert_eq!(payload.body, json!("fallback"));
    }

    #[test]
    fn test_all_fail() {
        let mut registry = DecoderRegistry::new();
        registry.register(decoder("broken", 1, true));
        let ct = ContentType::parse("application/json");
        let err = registry.decode(Some(&ct), b"x").unwrap_err();
        assert!(matches!(err, DecodeError::NoDecoder(Some(_))));
    }

    struct PathCaptor;
    struct FailingCaptor;
    struct PanickingCaptor;

    impl PluginInfo for PathCaptor {
        fn name(&self) -> &str {
            "path"
        }
        fn version(&self) -> &str {
            "test"
        }
    }

    impl PluginInfo for FailingCaptor {
        fn name(&self) -> &str {
            "failing"
        }
        fn version(&self) -> &str {
            "test"
        }
    }

    impl PluginInfo for PanickingCaptor {
        fn name(&self) -> &str {
            "panicking"
        }
        fn version(&self) -> &str {
            "test"
        }
    }

    impl RequestFieldCaptor for PathCaptor {
        fn priority(&self) -> i32 {
            30
        }

        fn capture(&self, exchange: &Exchange, event: &mut RequestEventBuilder) -> PluginResult<()> {
            event.path(exchange.request().path());
            Ok(())
        }
    }

    impl RequestFieldCaptor for FailingCaptor {
        fn capture(&self, _exchange: &Exchange, _event: &mut RequestEventBuilder) -> PluginResult<()> {
            Err(PluginError::OperationFailed("broken".into()))
        }
    }

    impl RequestFieldCaptor for PanickingCaptor {
        fn priority(&self) -> i32 {
            10
        }

        fn capture(&self, _exchange: &Exchange, _event: &mut RequestEventBuilder) -> PluginResult<()> {
            panic!("captor bug")
        }
    }

    #[test]
    fn test_failing_captors_do_not_abort_assembly() {
        let mut registry = CaptorRegistry::new();
        registry.register_request(Box::new(PathCaptor));
        registry.register_request(Box::new(FailingCaptor));
        registry.register_request(Box::new(PanickingCaptor));
        assert_eq!(registry.request_captors(), vec!["failing", "panicking", "path"]);

        let exchange = Exchange::new(snapshot(Method::GET, "/orders", b""));
        let mut builder = RequestEventBuilder::new(exchange.id());
        registry.capture_request(&exchange, &mut builder);

        assert_eq!(builder.build().path.as_deref(), Some("/orders"));
    }
}
