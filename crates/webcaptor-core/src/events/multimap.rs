//! Ordered multi-value map used for headers and query parameters

use http::HeaderMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Insertion-ordered map from a key to one or more values.
///
/// Keys keep the spelling of their first occurrence. Header maps compare keys
/// case-insensitively; query maps compare them exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiValueMap {
    entries: Vec<(String, Vec<String>)>,
    case_insensitive: bool,
}

impl MultiValueMap {
    /// Case-sensitive map (query parameters)
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive map (headers)
    pub fn case_insensitive() -> Self {
        Self {
            entries: Vec::new(),
            case_insensitive: true,
        }
    }

    /// Build a header map, preserving duplicate header lines in order
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut map = Self::case_insensitive();
        for (name, value) in headers {
            map.append(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
        map
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| {
            if self.case_insensitive {
                k.eq_ignore_ascii_case(key)
            } else {
                k == key
            }
        })
    }

    /// Add a value after any existing values for `key`
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(idx) => self.entries[idx].1.push(value.into()),
            None => self.entries.push((key, vec![value.into()])),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.position(key).map(|idx| self.entries[idx].1.as_slice())
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for MultiValueMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, values) in &self.entries {
            map.serialize_entry(key, values)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderValue, ACCEPT, CONTENT_TYPE};

    #[test]
    fn test_preserves_duplicates_and_order() {
        let mut map = MultiValueMap::new();
        map.append("tag", "b");
        map.append("page", "1");
        map.append("tag", "a");

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["tag", "page"]);
        assert_eq!(map.get("tag").unwrap(), ["b", "a"]);
        assert!(map.get("Tag").is_none());
    }

    #[test]
    fn test_header_keys_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.append(ACCEPT, HeaderValue::from_static("text/html"));
        headers.append(ACCEPT, HeaderValue::from_static("*/*"));

        let map = MultiValueMap::from_headers(&headers);
        assert_eq!(map.first("Content-Type"), Some("application/json"));
        assert_eq!(map.get("ACCEPT").unwrap().len(), 2);
    }

    #[test]
    fn test_serializes_as_object_of_arrays() {
        let mut map = MultiValueMap::new();
        map.append("q", "rust");
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json, serde_json::json!({ "q": ["rust"] }));
    }
}
