//! Decoded body payloads

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Attachments keyed by form field name
pub type FileAttachments = BTreeMap<String, Vec<AttachedFile>>;

/// A file part of a multipart body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachedFile {
    /// Form field the file was submitted under
    pub field_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Size in bytes
    pub size: usize,

    /// Raw file content (never serialized)
    #[serde(skip)]
    pub bytes: Bytes,
}

/// Decoded body: a value tree plus optional file attachments
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyPayload {
    pub body: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<FileAttachments>,
}

impl BodyPayload {
    pub fn new(body: Value) -> Self {
        Self { body, files: None }
    }

    /// Payload of an empty body
    pub fn null() -> Self {
        Self::new(Value::Null)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Value::String(text.into()))
    }

    pub fn with_files(mut self, files: FileAttachments) -> Self {
        self.files = Some(files);
        self
    }

    pub fn is_null(&self) -> bool {
        self.body.is_null()
    }

    /// Look up a top-level field of an object body
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }
}

/// Collapse a list of form values: one value becomes a scalar, several an array
pub fn collapse_values(mut values: Vec<String>) -> Value {
    if values.len() == 1 {
        Value::String(values.remove(0))
    } else {
        Value::Array(values.into_iter().map(Value::String).collect())
    }
}
