//! Response field captors

use crate::request::captor_info;
use std::sync::Arc;
use webcaptor_core::plugins::{
    ErrorAttributeOptions, ErrorAttributes, PluginError, PluginInfo, PluginResult,
    ResponseFieldCaptor,
};
use webcaptor_core::{MultiValueMap, ResponseBody, ResponseEventBuilder, ResponseView};

/// Final status code. Absent when a failure happened before a status was set.
#[derive(Debug, Default)]
pub struct StatusCaptor;

captor_info!(StatusCaptor, "status-captor", "Records the response status");

impl ResponseFieldCaptor for StatusCaptor {
    fn capture(&self, response: &ResponseView<'_>, event: &mut ResponseEventBuilder) -> PluginResult<()> {
        if let Some(status) = response.status() {
            event.status(status.as_u16());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ResponseHeadersCaptor;

captor_info!(ResponseHeadersCaptor, "response-headers-captor", "Records response headers");

impl ResponseFieldCaptor for ResponseHeadersCaptor {
    fn priority(&self) -> i32 {
        10
    }

    fn capture(&self, response: &ResponseView<'_>, event: &mut ResponseEventBuilder) -> PluginResult<()> {
        let headers = response
            .headers()
            .map(MultiValueMap::from_headers)
            .unwrap_or_else(MultiValueMap::case_insensitive);
        event.headers(headers);
        Ok(())
    }
}

/// Decoded response body from the resolved body promise
#[derive(Debug, Default)]
pub struct ResponseBodyCaptor;

captor_info!(ResponseBodyCaptor, "response-body-captor", "Records the decoded response body");

impl ResponseFieldCaptor for ResponseBodyCaptor {
    fn priority(&self) -> i32 {
        20
    }

    fn capture(&self, response: &ResponseView<'_>, event: &mut ResponseEventBuilder) -> PluginResult<()> {
        match response.body() {
            ResponseBody::Decoded(payload) => {
                event.body(payload.body.clone());
                Ok(())
            }
            ResponseBody::Undecodable(e) => Err(PluginError::OperationFailed(format!(
                "response body not decodable: {}",
                e
            ))),
            // Failures are summarized by the error captor
            ResponseBody::Failed(_) | ResponseBody::Abandoned => Ok(()),
        }
    }
}

/// Attaches error detail to failed and non-2xx responses. Runs last so its
/// message summary replaces any decoded body.
pub struct ResponseErrorCaptor {
    attributes: Arc<dyn ErrorAttributes>,
    options: ErrorAttributeOptions,
}

impl ResponseErrorCaptor {
    pub fn new(attributes: Arc<dyn ErrorAttributes>) -> Self {
        Self {
            attributes,
            options: ErrorAttributeOptions::all(),
        }
    }

    pub fn with_options(mut self, options: ErrorAttributeOptions) -> Self {
        self.options = options;
        self
    }
}

captor_info!(ResponseErrorCaptor, "response-error-captor", "Derives error detail for error responses");

impl ResponseFieldCaptor for ResponseErrorCaptor {
    fn priority(&self) -> i32 {
        i32::MAX
    }

    fn capture(&self, response: &ResponseView<'_>, event: &mut ResponseEventBuilder) -> PluginResult<()> {
        let is_error = response.failure().is_some()
            || response.status().is_some_and(|status| !status.is_success());
        if is_error {
            event.error_detail(self.attributes.error_attributes(response, &self.options));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResponseErrorCaptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseErrorCaptor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefaultErrorAttributes;
    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};
    use serde_json::json;
    use webcaptor_core::{
        BodyPayload, Exchange, FailureKind, HandlerFailure, RequestEventBuilder, RequestSnapshot,
    };

    fn exchange(status: Option<StatusCode>) -> Exchange {
        let exchange = Exchange::new(RequestSnapshot {
            method: Method::GET,
            uri: "/orders/9".parse().unwrap(),
            headers: HeaderMap::new(),
            remote_addr: None,
            body: Bytes::new(),
        });
        if let Some(status) = status {
            let mut headers = HeaderMap::new();
            headers.insert("content-type", "application/json".parse().unwrap());
            exchange.set_response_head(status, headers);
        }
        exchange
    }

    fn capture_all(exchange: &Exchange, body: &ResponseBody) -> webcaptor_core::ResponseEvent {
        let request = Arc::new(RequestEventBuilder::new(exchange.id()).build());
        let view = ResponseView::new(exchange, body);
        let mut builder = ResponseEventBuilder::new(exchange.id(), request);
        StatusCaptor.capture(&view, &mut builder).unwrap();
        ResponseHeadersCaptor.capture(&view, &mut builder).unwrap();
        let _ = ResponseBodyCaptor.capture(&view, &mut builder);
        ResponseErrorCaptor::new(Arc::new(DefaultErrorAttributes::new()))
            .capture(&view, &mut builder)
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_success_has_no_error_detail() {
        let exchange = exchange(Some(StatusCode::OK));
        let body = ResponseBody::Decoded(Arc::new(BodyPayload::new(json!({ "id": 9 }))));
        let event = capture_all(&exchange, &body);

        assert_eq!(event.status, Some(200));
        assert_eq!(event.body, Some(json!({ "id": 9 })));
        assert!(event.error_detail.is_none());
        assert_eq!(
            event.headers.unwrap().first("Content-Type"),
            Some("application/json")
        );
    }

    #[test]
    fn test_not_found_gets_error_detail() {
        let exchange = exchange(Some(StatusCode::NOT_FOUND));
        let body = ResponseBody::Decoded(Arc::new(BodyPayload::null()));
        let event = capture_all(&exchange, &body);

        assert_eq!(event.status, Some(404));
        let detail = event.error_detail.unwrap();
        assert_eq!(detail["status"], json!(404));
        assert_eq!(detail["path"], json!("/orders/9"));
        assert_eq!(event.body, Some(json!("Not Found")));
    }

    #[test]
    fn test_unhandled_failure_has_no_status() {
        let exchange = exchange(None);
        exchange.record_failure(HandlerFailure::new(FailureKind::Panic, "boom"));
        let body = ResponseBody::Abandoned;
        let event = capture_all(&exchange, &body);

        assert_eq!(event.status, None);
        let detail = event.error_detail.unwrap();
        assert_eq!(detail["message"], json!("boom"));
        assert_eq!(detail["status"], json!(500));
        assert_eq!(event.body, Some(json!("boom")));
    }

    #[test]
    fn test_stream_failure_after_success_status() {
        let exchange = exchange(Some(StatusCode::OK));
        let failure = HandlerFailure::new(FailureKind::BodyStream, "stream reset");
        let body = ResponseBody::Failed(Arc::new(failure));
        let event = capture_all(&exchange, &body);

        assert_eq!(event.status, Some(200));
        assert_eq!(event.error_detail.unwrap()["message"], json!("stream reset"));
    }

    #[test]
    fn test_redirect_gets_error_detail() {
        let exchange = exchange(Some(StatusCode::FOUND));
        let body = ResponseBody::Decoded(Arc::new(BodyPayload::null()));
        let event = capture_all(&exchange, &body);

        assert_eq!(event.status, Some(302));
        assert!(!event.is_error_response());
        let detail = event.error_detail.unwrap();
        assert_eq!(detail["status"], json!(302));
        assert_eq!(detail["path"], json!("/orders/9"));
    }
}
