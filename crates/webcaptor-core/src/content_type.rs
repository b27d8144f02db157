//! Declared content types and charset-aware text decoding

use encoding_rs::{Encoding, UTF_8};
use mime::Mime;
use std::fmt;

/// A `Content-Type` header value.
///
/// Keeps the raw header text so decoders can match on substrings even when the
/// value does not parse as a media type.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentType {
    raw: String,
    mime: Option<Mime>,
}

impl ContentType {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let mime = raw.parse::<Mime>().ok();
        Self { raw, mime }
    }

    /// Parse from a header value; non-UTF-8 values are decoded lossily
    pub fn from_header(value: &http::HeaderValue) -> Self {
        Self::parse(&String::from_utf8_lossy(value.as_bytes()))
    }

    /// Content type of a header map, if declared
    pub fn from_headers(headers: &http::HeaderMap) -> Option<Self> {
        headers
            .get(http::header::CONTENT_TYPE)
            .map(Self::from_header)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn mime(&self) -> Option<&Mime> {
        self.mime.as_ref()
    }

    /// `type/subtype` without parameters, lowercased
    pub fn essence(&self) -> String {
        match &self.mime {
            Some(m) => m.essence_str().to_ascii_lowercase(),
            None => self
                .raw
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase(),
        }
    }

    /// Case-insensitive substring match on the media type
    pub fn contains(&self, needle: &str) -> bool {
        self.essence().contains(&needle.to_ascii_lowercase())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.mime
            .as_ref()?
            .get_param(name)
            .map(|value| value.as_str().trim_matches('"'))
    }

    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    /// Encoding named by the charset parameter; UTF-8 when absent or unknown
    pub fn encoding(&self) -> &'static Encoding {
        self.charset()
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(UTF_8)
    }

    pub fn is_utf8(&self) -> bool {
        self.encoding() == UTF_8
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Decode bytes as text using the declared charset. Malformed sequences are
/// replaced, so this never fails.
pub fn decode_text(content_type: Option<&ContentType>, bytes: &[u8]) -> String {
    let encoding = content_type.map(ContentType::encoding).unwrap_or(UTF_8);
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_params() {
        let ct = ContentType::parse("multipart/form-data; boundary=\"abc123\"");
        assert_eq!(ct.essence(), "multipart/form-data");
        assert_eq!(ct.param("boundary"), Some("abc123"));
        assert!(ct.contains("multipart"));
    }

    #[test]
    fn test_vendor_json_matches() {
        let ct = ContentType::parse("application/vnd.api+json");
        assert!(ct.contains("json"));
        assert!(!ct.contains("xml"));
    }

    #[test]
    fn test_unparseable_keeps_raw() {
        let ct = ContentType::parse("not a media type; charset=latin1");
        assert!(ct.mime().is_none());
        assert_eq!(ct.as_str(), "not a media type; charset=latin1");
        assert_eq!(ct.encoding(), UTF_8);
    }

    #[test]
    fn test_decode_text_charset() {
        let latin1 = ContentType::parse("text/plain; charset=ISO-8859-1");
        assert_eq!(decode_text(Some(&latin1), &[0x63, 0x61, 0x66, 0xe9]), "café");
        assert_eq!(decode_text(None, "café".as_bytes()), "café");

        let unknown = ContentType::parse("text/plain; charset=klingon");
        assert_eq!(decode_text(Some(&unknown), b"plain"), "plain");
    }
}
