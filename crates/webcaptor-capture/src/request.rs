//! Request field captors

use std::collections::BTreeMap;
use std::sync::Arc;
use url::form_urlencoded;
use webcaptor_core::plugins::{PluginInfo, PluginResult, RequestFieldCaptor};
use webcaptor_core::registry::DecoderRegistry;
use webcaptor_core::{Exchange, HttpMethod, MultiValueMap, RequestEventBuilder};

macro_rules! captor_info {
    ($ty:ty, $name:literal, $description:literal) => {
        impl PluginInfo for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn version(&self) -> &str {
                env!("CARGO_PKG_VERSION")
            }

            fn description(&self) -> &str {
                $description
            }
        }
    };
}

pub(crate) use captor_info;

/// Whether routing matched a handler
#[derive(Debug, Default)]
pub struct EndpointExistsCaptor;

captor_info!(EndpointExistsCaptor, "endpoint-exists-captor", "Records whether a route matched");

impl RequestFieldCaptor for EndpointExistsCaptor {
    fn capture(&self, exchange: &Exchange, event: &mut RequestEventBuilder) -> PluginResult<()> {
        event.endpoint_exists(exchange.endpoint_exists());
        Ok(())
    }
}

/// Request URL without the query string
#[derive(Debug, Default)]
pub struct FullUrlCaptor;

captor_info!(FullUrlCaptor, "full-url-captor", "Records the request URL");

impl RequestFieldCaptor for FullUrlCaptor {
    fn priority(&self) -> i32 {
        10
    }

    fn capture(&self, exchange: &Exchange, event: &mut RequestEventBuilder) -> PluginResult<()> {
        event.full_url(exchange.request().full_url());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct PathCaptor;

captor_info!(PathCaptor, "path-captor", "Records the request path");

impl RequestFieldCaptor for PathCaptor {
    fn priority(&self) -> i32 {
        20
    }

    fn capture(&self, exchange: &Exchange, event: &mut RequestEventBuilder) -> PluginResult<()> {
        event.path(exchange.request().path());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MethodCaptor;

captor_info!(MethodCaptor, "method-captor", "Records the HTTP method");

impl RequestFieldCaptor for MethodCaptor {
    fn priority(&self) -> i32 {
        30
    }

    fn capture(&self, exchange: &Exchange, event: &mut RequestEventBuilder) -> PluginResult<()> {
        event.method(HttpMethod::from(&exchange.request().method));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RequestHeadersCaptor;

captor_info!(RequestHeadersCaptor, "request-headers-captor", "Records request headers");

impl RequestFieldCaptor for RequestHeadersCaptor {
    fn priority(&self) -> i32 {
        40
    }

    fn capture(&self, exchange: &Exchange, event: &mut RequestEventBuilder) -> PluginResult<()> {
        event.headers(MultiValueMap::from_headers(&exchange.request().headers));
        Ok(())
    }
}

/// Query string parameters; repeated keys keep every value
#[derive(Debug, Default)]
pub struct QueryParamsCaptor;

captor_info!(QueryParamsCaptor, "query-params-captor", "Records query string parameters");

impl RequestFieldCaptor for QueryParamsCaptor {
    fn priority(&self) -> i32 {
        50
    }

    fn capture(&self, exchange: &Exchange, event: &mut RequestEventBuilder) -> PluginResult<()> {
        let mut params = MultiValueMap::new();
        if let Some(query) = exchange.request().query() {
            for (key, value) in form_urlencoded::parse(query.as_bytes()) {
                params.append(key, value);
            }
        }
        event.query_params(params);
        Ok(())
    }
}

/// Template variables of the matched route. Empty when no route matched.
#[derive(Debug, Default)]
pub struct PathParamsCaptor;

captor_info!(PathParamsCaptor, "path-params-captor", "Records matched path variables");

impl RequestFieldCaptor for PathParamsCaptor {
    fn priority(&self) -> i32 {
        60
    }

    fn capture(&self, exchange: &Exchange, event: &mut RequestEventBuilder) -> PluginResult<()> {
        let params: BTreeMap<String, String> = exchange
            .route()
            .map(|route| route.params.iter().cloned().collect())
            .unwrap_or_default();
        event.path_params(params);
        Ok(())
    }
}

/// Buffered request body, decoded through the decoder registry
pub struct RequestBodyCaptor {
    decoders: Arc<DecoderRegistry>,
}

impl RequestBodyCaptor {
    pub fn new(decoders: Arc<DecoderRegistry>) -> Self {
        Self { decoders }
    }
}

captor_info!(RequestBodyCaptor, "request-body-captor", "Decodes the buffered request body");

impl RequestFieldCaptor for RequestBodyCaptor {
    fn priority(&self) -> i32 {
        70
    }

    fn capture(&self, exchange: &Exchange, event: &mut RequestEventBuilder) -> PluginResult<()> {
        let request = exchange.request();
        let content_type = request.content_type();
        let payload = self.decoders.decode(content_type.as_ref(), &request.body)?;
        event.body(payload);
        Ok(())
    }
}

impl std::fmt::Debug for RequestBodyCaptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBodyCaptor")
            .field("decoders", &self.decoders.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, Method};
    use serde_json::json;
    use webcaptor_core::config::CaptorConfig;
    use webcaptor_core::{RequestSnapshot, RouteMatch};

    fn exchange(
        method: Method,
        uri: &str,
        headers: &[(&'static str, &str)],
        body: &'static [u8],
    ) -> Exchange {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, value.parse().unwrap());
        }
        Exchange::new(RequestSnapshot {
            method,
            uri: uri.parse().unwrap(),
            headers: map,
            remote_addr: None,
            body: Bytes::from_static(body),
        })
    }

    #[test]
    fn test_url_path_and_method() {
        let exchange = exchange(
            Method::GET,
            "/users/7?x=1",
            &[("host", "localhost:8080")],
            b"",
        );
        let mut builder = RequestEventBuilder::new(exchange.id());
        FullUrlCaptor.capture(&exchange, &mut builder).unwrap();
        PathCaptor.capture(&exchange, &mut builder).unwrap();
        MethodCaptor.capture(&exchange, &mut builder).unwrap();
        let event = builder.build();

        assert_eq!(event.full_url.as_deref(), Some("http://localhost:8080/users/7"));
        assert_eq!(event.path.as_deref(), Some("/users/7"));
        assert_eq!(event.method, Some(HttpMethod::Get));
        assert!(event.headers.is_none());
    }

    #[test]
    fn test_query_params_keep_repeated_values() {
        let exchange = exchange(Method::GET, "/search?tag=a&tag=b&q=rust+lang", &[], b"");
        let mut builder = RequestEventBuilder::new(exchange.id());
        QueryParamsCaptor.capture(&exchange, &mut builder).unwrap();
        let params = builder.build().query_params.unwrap();

        assert_eq!(params.get("tag").unwrap(), ["a", "b"]);
        assert_eq!(params.first("q"), Some("rust lang"));
    }

    #[test]
    fn test_query_params_empty_but_present() {
        let exchange = exchange(Method::GET, "/plain", &[], b"");
        let mut builder = RequestEventBuilder::new(exchange.id());
        QueryParamsCaptor.capture(&exchange, &mut builder).unwrap();
        assert!(builder.build().query_params.unwrap().is_empty());
    }

    #[test]
    fn test_endpoint_and_path_params_follow_route() {
        let exchange = exchange(Method::GET, "/users/42", &[], b"");
        let mut before = RequestEventBuilder::new(exchange.id());
        EndpointExistsCaptor.capture(&exchange, &mut before).unwrap();
        PathParamsCaptor.capture(&exchange, &mut before).unwrap();
        let before = before.build();
        assert_eq!(before.endpoint_exists, Some(false));
        assert!(before.path_params.unwrap().is_empty());

        exchange.set_route(RouteMatch {
            template: "/users/{id}".into(),
            params: vec![("id".into(), "42".into())],
        });
        let mut after = RequestEventBuilder::new(exchange.id());
        EndpointExistsCaptor.capture(&exchange, &mut after).unwrap();
        PathParamsCaptor.capture(&exchange, &mut after).unwrap();
        let after = after.build();
        assert_eq!(after.endpoint_exists, Some(true));
        assert_eq!(after.path_params.unwrap()["id"], "42");
    }

    #[test]
    fn test_headers_multi_valued() {
        let exchange = exchange(
            Method::GET,
            "/",
            &[("accept", "text/html"), ("accept", "application/json")],
            b"",
        );
        let mut builder = RequestEventBuilder::new(exchange.id());
        RequestHeadersCaptor.capture(&exchange, &mut builder).unwrap();
        let headers = builder.build().headers.unwrap();
        assert_eq!(headers.get("Accept").unwrap().len(), 2);
    }

    #[test]
    fn test_body_decoded_with_request_content_type() {
        let decoders = Arc::new(webcaptor_decode::default_registry(&CaptorConfig::default()));
        let captor = RequestBodyCaptor::new(decoders);

        let exchange = exchange(
            Method::POST,
            "/echo",
            &[("content-type", "application/json")],
            br#"{"name":"David"}"#,
        );
        let mut builder = RequestEventBuilder::new(exchange.id());
        captor.capture(&exchange, &mut builder).unwrap();
        let body = builder.build().body.unwrap();
        assert_eq!(body.get("name"), Some(&json!("David")));
    }

    #[test]
    fn test_body_without_content_type_is_text() {
        let decoders = Arc::new(webcaptor_decode::default_registry(&CaptorConfig::default()));
        let captor = RequestBodyCaptor::new(decoders);

        let exchange = exchange(Method::POST, "/echo", &[], b"hello there");
        let mut builder = RequestEventBuilder::new(exchange.id());
        captor.capture(&exchange, &mut builder).unwrap();
        assert_eq!(builder.build().body.unwrap().body, json!("hello there"));
    }
}
