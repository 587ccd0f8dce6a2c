//! Host error phase.
//!
//! # Responsibilities
//! - Turn errors raised by middleware into HTTP responses
//! - Classify known error types, default everything else to 500
//!
//! # Design Decisions
//! - The chain hands errors over untouched; classification happens only here
//! - Bodies follow `{"statusCode", "error", "message"}` JSON
//! - 5xx are logged at error level, 4xx at debug

use axum::{
    body::Body,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::error::BoxError;

/// An error carrying the status code it should be answered with.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = json!({
            "statusCode": self.status.as_u16(),
            "error": self.status.canonical_reason().unwrap_or("Unknown"),
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

/// Receives errors a middleware passed to `next.fail`.
pub trait ErrorHandler: Send + Sync + 'static {
    fn handle(&self, err: BoxError, request: &Parts) -> Response<Body>;
}

impl<F> ErrorHandler for F
where
    F: Fn(BoxError, &Parts) -> Response<Body> + Send + Sync + 'static,
{
    fn handle(&self, err: BoxError, request: &Parts) -> Response<Body> {
        (self)(err, request)
    }
}

/// Answers [`HttpError`]s with their own status and anything else with 500.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle(&self, err: BoxError, request: &Parts) -> Response<Body> {
        let http = match err.downcast::<HttpError>() {
            Ok(http) => *http,
            Err(other) => HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };
        if http.status.is_server_error() {
            tracing::error!(
                method = %request.method,
                path = %request.uri.path(),
                status = http.status.as_u16(),
                error = %http.message,
                "middleware error"
            );
        } else {
            tracing::debug!(status = http.status.as_u16(), error = %http.message, "middleware rejected request");
        }
        http.into_response()
    }
}
