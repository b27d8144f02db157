//! URL-encoded form decoder

use crate::TYPED_DECODER_PRIORITY;
use serde_json::{Map, Value};
use url::form_urlencoded;
use webcaptor_core::events::collapse_values;
use webcaptor_core::plugins::{BodyDecoder, DecodeError, PluginInfo};
use webcaptor_core::{BodyPayload, ContentType};

/// Decodes `application/x-www-form-urlencoded` bodies into an object.
/// Single-valued keys become scalars, repeated keys arrays.
#[derive(Debug, Default)]
pub struct FormUrlEncodedDecoder;

impl FormUrlEncodedDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl PluginInfo for FormUrlEncodedDecoder {
    fn name(&self) -> &str {
        "form-urlencoded-decoder"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Decodes url-encoded form bodies"
    }
}

impl BodyDecoder for FormUrlEncodedDecoder {
    fn priority(&self) -> i32 {
        TYPED_DECODER_PRIORITY
    }

    fn supports(&self, content_type: Option<&ContentType>) -> bool {
        content_type.is_some_and(|ct| ct.contains("x-www-form-urlencoded"))
    }

    fn decode(
        &self,
        _content_type: Option<&ContentType>,
        bytes: &[u8],
    ) -> Result<BodyPayload, DecodeError> {
        if bytes.is_empty() {
            return Ok(BodyPayload::null());
        }
        Ok(BodyPayload::new(group_pairs(form_urlencoded::parse(bytes))))
    }
}

/// Group key/value pairs in first-seen key order and collapse single values
pub(crate) fn group_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Value
where
    K: Into<String>,
    V: Into<String>,
{
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in pairs {
        let key = key.into();
        match grouped.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value.into()),
            None => grouped.push((key, vec![value.into()])),
        }
    }

    let map: Map<String, Value> = grouped
        .into_iter()
        .map(|(key, values)| (key, collapse_values(values)))
        .collect();
    Value::Object(map)
}
