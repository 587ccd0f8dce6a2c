//! Body parsing phase.
//!
//! Buffers the request body up to the configured limit, parses JSON,
//! url-encoded and text payloads into [`Decorations::body`], and hands the
//! untouched bytes on to later phases.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use super::decorate::{parse_query, Decorations};
use super::error::HttpError;

/// Parse the body into the request's decorations before the next phase.
pub async fn parse_body(State(limit): State<usize>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    if declared_length(&parts.headers).is_some_and(|len| len > limit) {
        return HttpError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body is too large").into_response();
    }
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(error = %err, "failed to read request body");
            return HttpError::new(StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    let parsed = match parse(&parts.headers, &bytes) {
        Ok(parsed) => parsed,
        Err(err) => return err.into_response(),
    };
    if parsed.is_some() {
        if parts.extensions.get::<Decorations>().is_none() {
            parts.extensions.insert(Decorations::default());
        }
        if let Some(decorations) = parts.extensions.get_mut::<Decorations>() {
            decorations.body = parsed;
        }
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Parse `bytes` according to the request's content type.
///
/// Empty bodies and unknown content types yield `None`.
pub fn parse(headers: &HeaderMap, bytes: &Bytes) -> Result<Option<Value>, HttpError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if content_type == "application/json" || content_type.ends_with("+json") {
        serde_json::from_slice(bytes)
            .map(Some)
            .map_err(|e| HttpError::new(StatusCode::BAD_REQUEST, format!("Body is not valid JSON: {e}")))
    } else if content_type == "application/x-www-form-urlencoded" {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| HttpError::new(StatusCode::BAD_REQUEST, "Form body is not valid UTF-8"))?;
        Ok(Some(Value::Object(parse_query(text))))
    } else if content_type.starts_with("text/") {
        Ok(Some(Value::String(String::from_utf8_lossy(bytes).into_owned())))
    } else {
        Ok(None)
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
