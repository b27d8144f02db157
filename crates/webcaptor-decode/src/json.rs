//! JSON body decoder

use crate::TYPED_DECODER_PRIORITY;
use serde_json::Value;
use webcaptor_core::content_type::decode_text;
use webcaptor_core::plugins::{BodyDecoder, DecodeError, PluginInfo};
use webcaptor_core::{BodyPayload, ContentType};

/// Decodes any content type mentioning `json` (`application/json`,
/// `application/problem+json`, ...). Malformed input is an error so the
/// registry falls through to the text decoder.
#[derive(Debug, Default)]
pub struct JsonDecoder;

impl JsonDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl PluginInfo for JsonDecoder {
    fn name(&self) -> &str {
        "json-decoder"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Decodes JSON bodies into value trees"
    }
}

impl BodyDecoder for JsonDecoder {
    fn priority(&self) -> i32 {
        TYPED_DECODER_PRIORITY
    }

    fn supports(&self, content_type: Option<&ContentType>) -> bool {
        content_type.is_some_and(|ct| ct.contains("json"))
    }

    fn decode(
        &self,
        content_type: Option<&ContentType>,
        bytes: &[u8],
    ) -> Result<BodyPayload, DecodeError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(BodyPayload::null());
        }

        // Non UTF-8 charsets are transcoded first
        let declared_utf8 = content_type.map_or(true, ContentType::is_utf8);
        let value: Value = if declared_utf8 {
            serde_json::from_slice(bytes)
        } else {
            serde_json::from_str(&decode_text(content_type, bytes))
        }
        .map_err(|e| DecodeError::malformed(content_type, e))?;

        Ok(BodyPayload::new(value))
    }
}
