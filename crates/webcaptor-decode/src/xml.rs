//! XML body decoder

use crate::TYPED_DECODER_PRIORITY;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use webcaptor_core::content_type::decode_text;
use webcaptor_core::plugins::{BodyDecoder, DecodeError, PluginInfo};
use webcaptor_core::{BodyPayload, ContentType};

/// Key holding text content of elements that also have children or attributes
const MIXED_TEXT_KEY: &str = "";

/// Decodes XML documents into a value tree.
///
/// The root element is unwrapped. Attributes and child elements become
/// object fields, repeated children become arrays and text-only elements
/// become strings.
#[derive(Debug, Default)]
pub struct XmlDecoder;

impl XmlDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl PluginInfo for XmlDecoder {
    fn name(&self) -> &str {
        "xml-decoder"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Decodes XML documents into value trees"
    }
}

impl BodyDecoder for XmlDecoder {
    fn priority(&self) -> i32 {
        TYPED_DECODER_PRIORITY
    }

    fn supports(&self, content_type: Option<&ContentType>) -> bool {
        content_type.is_some_and(|ct| ct.contains("xml"))
    }

    fn decode(
        &self,
        content_type: Option<&ContentType>,
        bytes: &[u8],
    ) -> Result<BodyPayload, DecodeError> {
        let text = decode_text(content_type, bytes);
        if text.trim().is_empty() {
            return Ok(BodyPayload::null());
        }
        let value = parse_document(&text).map_err(|e| DecodeError::malformed(content_type, e))?;
        Ok(BodyPayload::new(value))
    }
}

/// Element under construction
struct Frame {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self, String> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut fields = Map::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            fields.insert(key, Value::String(value.into_owned()));
        }
        Ok(Self {
            name,
            fields,
            text: String::new(),
        })
    }

    fn close(mut self) -> (String, Value) {
        if self.fields.is_empty() {
            return (self.name, Value::String(self.text));
        }
        if !self.text.is_empty() {
            self.fields
                .insert(MIXED_TEXT_KEY.to_string(), Value::String(self.text));
        }
        (self.name, Value::Object(self.fields))
    }
}

fn parse_document(text: &str) -> Result<Value, String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(start) => stack.push(Frame::open(&start)?),
            Event::Empty(start) => {
                let (name, value) = Frame::open(&start)?.close();
                attach(&mut stack, &mut root, name, value);
            }
            Event::End(_) => {
                let frame = stack.pop().ok_or("unexpected closing tag")?;
                let (name, value) = frame.close();
                attach(&mut stack, &mut root, name, value);
            }
            Event::Text(t) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&t.unescape().map_err(|e| e.to_string())?);
                }
            }
            Event::CData(c) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }
    Ok(root.unwrap_or(Value::Null))
}

/// Attach a finished element to its parent, or make it the document root
fn attach(stack: &mut [Frame], root: &mut Option<Value>, name: String, value: Value) {
    let Some(parent) = stack.last_mut() else {
        root.get_or_insert(value);
        return;
    };
    match parent.fields.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.fields.insert(name, value);
        }
    }
}
