//! HTTP method

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of request methods; anything else is `Unknown`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
    Connect,
    Unknown,
}

impl HttpMethod {
    /// Strict lookup, case-insensitive. Returns `None` for unrecognized verbs.
    pub fn from_token(raw: &str) -> Option<Self> {
        let method = match raw.trim().to_ascii_uppercase().as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "DELETE" => HttpMethod::Delete,
            "PATCH" => HttpMethod::Patch,
            "HEAD" => HttpMethod::Head,
            "OPTIONS" => HttpMethod::Options,
            "TRACE" => HttpMethod::Trace,
            "CONNECT" => HttpMethod::Connect,
            _ => return None,
        };
        Some(method)
    }

    /// Lenient parse used on live traffic; never fails
    pub fn parse(raw: &str) -> Self {
        Self::from_token(raw).unwrap_or(HttpMethod::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Unknown => "UNKNOWN",
        }
    }
}

impl From<&http::Method> for HttpMethod {
    fn from(method: &http::Method) -> Self {
        Self::parse(method.as_str())
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(HttpMethod::parse("get"), HttpMethod::Get);
        assert_eq!(HttpMethod::parse("Patch"), HttpMethod::Patch);
        assert_eq!(HttpMethod::parse(" DELETE "), HttpMethod::Delete);
    }

    #[test]
    fn test_unknown_verb() {
        assert_eq!(HttpMethod::parse("PROPFIND"), HttpMethod::Unknown);
        assert_eq!(HttpMethod::from_token("PROPFIND"), None);
        let custom = http::Method::from_bytes(b"MKCOL").unwrap();
        assert_eq!(HttpMethod::from(&custom), HttpMethod::Unknown);
    }

    #[test]
    fn test_serde_uppercase() {
        assert_eq!(
            serde_json::to_string(&HttpMethod::Options).unwrap(),
            "\"OPTIONS\""
        );
    }
}
