//! Catch-all text decoder

use webcaptor_core::content_type::decode_text;
use webcaptor_core::plugins::{BodyDecoder, DecodeError, PluginInfo};
use webcaptor_core::{BodyPayload, ContentType};

/// Lowest-priority decoder. Accepts every content type; empty bodies become
/// null, anything else a text node in the declared charset (UTF-8 default).
#[derive(Debug, Default)]
pub struct TextDecoder;

impl TextDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl PluginInfo for TextDecoder {
    fn name(&self) -> &str {
        "text-decoder"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Fallback decoder producing text nodes"
    }
}

impl BodyDecoder for TextDecoder {
    fn priority(&self) -> i32 {
        i32::MAX
    }

    fn supports(&self, _content_type: Option<&ContentType>) -> bool {
        true
    }

    fn decode(
        &self,
        content_type: Option<&ContentType>,
        bytes: &[u8],
    ) -> Result<BodyPayload, DecodeError> {
        if bytes.is_empty() {
            return Ok(BodyPayload::null());
        }
        Ok(BodyPayload::text(decode_text(content_type, bytes)))
    }
}
