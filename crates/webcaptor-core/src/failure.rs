//! Handler failures funneled into error events

use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use thiserror::Error;

/// How the downstream handler failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The service returned an error
    Error,
    /// The handler panicked
    Panic,
    /// The response body stream failed
    BodyStream,
}

/// A failure raised while the downstream handler was processing the request
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerFailure {
    pub kind: FailureKind,

    /// Human-readable failure message
    pub message: String,

    /// Type name of the underlying error, when known
    pub exception: Option<String>,

    /// Validation sub-errors
    pub errors: Vec<Value>,
}

impl HandlerFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exception: None,
            errors: Vec::new(),
        }
    }

    /// From a service error
    pub fn from_error<E: fmt::Display + ?Sized>(err: &E) -> Self {
        let mut failure = Self::new(FailureKind::Error, err.to_string());
        failure.exception = Some(std::any::type_name::<E>().to_string());
        failure
    }

    /// From a caught panic payload
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        let mut failure = Self::new(FailureKind::Panic, message);
        failure.exception = Some("panic".to_string());
        failure
    }

    /// From a body stream error
    pub fn body_stream<E: fmt::Display + ?Sized>(err: &E) -> Self {
        let mut failure = Self::new(FailureKind::BodyStream, err.to_string());
        failure.exception = Some(std::any::type_name::<E>().to_string());
        failure
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<Value>) -> Self {
        self.errors = errors;
        self
    }
}
