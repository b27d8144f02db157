//! Endpoint exclusion rules
//!
//! A rule pairs a method set (or `*`) with an Ant-style path pattern:
//! `?` matches one character, `*` zero or more characters within a segment,
//! `**` zero or more whole segments, and `{name}` / `{name:regex}` one segment.
//!
//! [`ExclusionRules`] is also the built-in publish condition for both request
//! and response events.

use crate::config::ExcludedEndpoint;
use crate::events::HttpMethod;
use crate::exchange::{Exchange, ResponseView};
use crate::plugins::{PluginInfo, RequestPublishCondition, ResponsePublishCondition};
use regex::Regex;
use tracing::warn;

/// Compiled exclusion rule
#[derive(Debug, Clone)]
pub struct ExclusionRule {
    /// `None` matches every method
    methods: Option<Vec<HttpMethod>>,
    pattern: Regex,
    source: String,
}

impl ExclusionRule {
    pub fn compile(endpoint: &ExcludedEndpoint) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&ant_to_regex(&endpoint.path))?;
        Ok(Self {
            methods: parse_methods(&endpoint.method),
            pattern,
            source: endpoint.path.clone(),
        })
    }

    pub fn matches(&self, method: HttpMethod, path: &str) -> bool {
        let method_matches = match &self.methods {
            None => true,
            Some(methods) => methods.contains(&method),
        };
        method_matches && self.pattern.is_match(path)
    }

    pub fn pattern(&self) -> &str {
        &self.source
    }
}

/// All configured exclusion rules
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    rules: Vec<ExclusionRule>,
}

impl ExclusionRules {
    /// Compile configured rules; rules with an invalid pattern are skipped
    pub fn from_config(endpoints: &[ExcludedEndpoint]) -> Self {
        let rules = endpoints
            .iter()
            .filter_map(|endpoint| match ExclusionRule::compile(endpoint) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!("Ignoring excluded endpoint {}: {}", endpoint.path, e);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn is_excluded(&self, method: HttpMethod, path: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(method, path))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn allows(&self, exchange: &Exchange) -> bool {
        let request = exchange.request();
        !self.is_excluded((&request.method).into(), request.path())
    }
}

impl PluginInfo for ExclusionRules {
    fn name(&self) -> &str {
        "excluded-endpoints"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Suppresses events for configured method and path patterns"
    }
}

impl RequestPublishCondition for ExclusionRules {
    fn should_publish_request(&self, exchange: &Exchange) -> bool {
        self.allows(exchange)
    }
}

impl ResponsePublishCondition for ExclusionRules {
    fn should_publish_response(&self, response: &ResponseView<'_>) -> bool {
        self.allows(response.exchange())
    }
}

/// Parse a comma-separated method list. `*` (or an empty list) means any.
/// Unrecognized methods are skipped with a warning.
fn parse_methods(raw: &str) -> Option<Vec<HttpMethod>> {
    let tokens: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() || tokens.contains(&"*") {
        return None;
    }

    let methods = tokens
        .into_iter()
        .filter_map(|token| {
            let method = HttpMethod::from_token(token);
            if method.is_none() {
                warn!("Ignoring invalid HTTP method in excluded endpoint: {}", token);
            }
            method
        })
        .collect();
    Some(methods)
}

/// Translate an Ant-style path pattern into an anchored regex
fn ant_to_regex(pattern: &str) -> String {
    let mut re = String::from("^");
    for segment in pattern.trim_start_matches('/').split('/') {
        if segment == "**" {
            re.push_str("(?:/[^/]*)*");
        } else {
            re.push('/');
            re.push_str(&segment_to_regex(segment));
        }
    }
    re.push_str("/?$");
    re
}

fn segment_to_regex(segment: &str) -> String {
    let mut out = String::new();
    let mut chars = segment.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                // A stray "**" inside a segment behaves like "*"
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                out.push_str("[^/]*");
            }
            '?' => out.push_str("[^/]"),
            '{' => {
                let mut var = String::new();
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                    var.push(inner);
                }
                match var.split_once(':') {
                    Some((_, custom)) => {
                        out.push_str("(?:");
                        out.push_str(custom);
                        out.push(')');
                    }
                    None => out.push_str("[^/]+"),
                }
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(method: &str, path: &str) -> ExclusionRule {
        ExclusionRule::compile(&ExcludedEndpoint {
            method: method.to_string(),
            path: path.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_double_star() {
        let r = rule("*", "/actuator/**");
        assert!(r.matches(HttpMethod::Get, "/actuator"));
        assert!(r.matches(HttpMethod::Post, "/actuator/health"));
        assert!(r.matches(HttpMethod::Get, "/actuator/metrics/jvm"));
        assert!(!r.matches(HttpMethod::Get, "/actuators"));
        assert!(!r.matches(HttpMethod::Get, "/api/actuator"));
    }

    #[test]
    fn test_single_star_and_question_mark() {
        let r = rule("*", "/files/*.txt");
        assert!(r.matches(HttpMethod::Get, "/files/a.txt"));
        assert!(!r.matches(HttpMethod::Get, "/files/dir/a.txt"));

        let r = rule("*", "/v?/ping");
        assert!(r.matches(HttpMethod::Get, "/v1/ping"));
        assert!(!r.matches(HttpMethod::Get, "/v10/ping"));
    }

    #[test]
    fn test_path_variables() {
        let r = rule("*", "/users/{id}/avatar");
        assert!(r.matches(HttpMethod::Get, "/users/42/avatar"));
        assert!(!r.matches(HttpMethod::Get, "/users//avatar"));

        let r = rule("*", "/users/{id:[0-9]+}");
        assert!(r.matches(HttpMethod::Get, "/users/42"));
        assert!(!r.matches(HttpMethod::Get, "/users/abc"));
    }

    #[test]
    fn test_literal_characters_escaped() {
        let r = rule("*", "/a.b");
        assert!(r.matches(HttpMethod::Get, "/a.b"));
        assert!(!r.matches(HttpMethod::Get, "/axb"));
    }

    #[test]
    fn test_method_list() {
        let r = rule("GET, post", "/health");
        assert!(r.matches(HttpMethod::Get, "/health"));
        assert!(r.matches(HttpMethod::Post, "/health"));
        assert!(!r.matches(HttpMethod::Delete, "/health"));
    }

    #[test]
    fn test_publish_condition() {
        use crate::exchange::tests::snapshot;
        use crate::promise::ResponseBody;
        use http::Method;

        let rules = ExclusionRules::from_config(&[ExcludedEndpoint {
            method: "GET".to_string(),
            path: "/health/**".to_string(),
        }]);

        let excluded = Exchange::new(snapshot(Method::GET, "/health/live?verbose", b""));
        let kept = Exchange::new(snapshot(Method::POST, "/health/live", b""));
        assert!(!rules.should_publish_request(&excluded));
        assert!(rules.should_publish_request(&kept));

        let body = ResponseBody::Abandoned;
        assert!(!rules.should_publish_response(&ResponseView::new(&excluded, &body)));
        assert!(rules.should_publish_response(&ResponseView::new(&kept, &body)));
    }

    #[test]
    fn test_invalid_method_skipped() {
        let r = rule("GET,FETCH", "/health");
        assert!(r.matches(HttpMethod::Get, "/health"));
        assert!(!r.matches(HttpMethod::Unknown, "/health"));
    }

    #[test]
    fn test_rules_from_config() {
        let rules = ExclusionRules::from_config(&[
            ExcludedEndpoint {
                method: "*".into(),
                path: "/internal/**".into(),
            },
            ExcludedEndpoint {
                method: "*".into(),
                path: "/bad/{id:[}".into(),
            },
        ]);
        assert_eq!(rules.len(), 1);
        assert!(rules.is_excluded(HttpMethod::Put, "/internal/cache"));
        assert!(!rules.is_excluded(HttpMethod::Put, "/public"));
    }
}
