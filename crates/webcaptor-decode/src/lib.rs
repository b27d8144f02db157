//! Body decoders for webcaptor
//!
//! This crate provides the built-in decoders that turn buffered request and
//! response bodies into structured value trees:
//!
//! - **JsonDecoder**: any `*json*` content type
//! - **XmlDecoder**: any `*xml*` content type (feature `xml`)
//! - **MultipartDecoder**: `multipart/*` form fields and file attachments
//! - **FormUrlEncodedDecoder**: `application/x-www-form-urlencoded`
//! - **TextDecoder**: catch-all text fallback, always tried last

pub mod form;
pub mod json;
pub mod multipart;
pub mod text;
#[cfg(feature = "xml")]
pub mod xml;

pub use form::FormUrlEncodedDecoder;
pub use json::JsonDecoder;
pub use multipart::MultipartDecoder;
pub use text::TextDecoder;
#[cfg(feature = "xml")]
pub use xml::XmlDecoder;

use webcaptor_core::config::CaptorConfig;
use webcaptor_core::registry::DecoderRegistry;

/// Priority shared by the content-type specific decoders
pub const TYPED_DECODER_PRIORITY: i32 = 1;

/// Registry with every built-in decoder
pub fn default_registry(config: &CaptorConfig) -> DecoderRegistry {
    let mut registry = DecoderRegistry::new();
    registry.register(Box::new(JsonDecoder::new()));
    #[cfg(feature = "xml")]
    registry.register(Box::new(XmlDecoder::new()));
    registry.register(Box::new(MultipartDecoder::new(
        config.event_details.include_multipart_files,
    )));
    registry.register(Box::new(FormUrlEncodedDecoder::new()));
    registry.register(Box::new(TextDecoder::new()));
    registry
}
