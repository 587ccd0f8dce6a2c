//! CORS headers and preflight answers.

use axum::http::{header, HeaderValue, Method, StatusCode};
use futures_util::future::BoxFuture;

use crate::chain::{Middleware, Next};
use crate::exchange::{RawRequest, RawResponse};

const DEFAULT_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

/// Adds `access-control-allow-origin` to every response and answers
/// preflight requests with 204 without running later phases.
#[derive(Debug, Clone)]
pub struct Cors {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
}

impl Cors {
    /// Allow any origin.
    pub fn permissive() -> Self {
        Self {
            allow_origin: HeaderValue::from_static("*"),
            allow_methods: HeaderValue::from_static(DEFAULT_METHODS),
        }
    }

    /// Allow a single origin. Falls back to `*` if `origin` is not a valid
    /// header value.
    pub fn allow_origin(origin: &str) -> Self {
        let mut cors = Self::permissive();
        match HeaderValue::from_str(origin) {
            Ok(value) => cors.allow_origin = value,
            Err(_) => tracing::warn!(origin, "invalid CORS origin; allowing any origin"),
        }
        cors
    }

    async fn run(self, req: RawRequest, res: RawResponse, next: Next) {
        let preflight = req.method() == Method::OPTIONS
            && req.header(&header::ACCESS_CONTROL_REQUEST_METHOD).is_some();

        let applied = res
            .set_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin)
            .and_then(|_| {
                if !preflight {
                    return Ok(());
                }
                res.set_header(header::ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods)?;
                if let Some(requested) = req.header(&header::ACCESS_CONTROL_REQUEST_HEADERS) {
                    res.set_header(header::ACCESS_CONTROL_ALLOW_HEADERS, requested)?;
                    res.append_header(header::VARY, HeaderValue::from_static("Access-Control-Request-Headers"))?;
                }
                res.set_header(header::CONTENT_LENGTH, HeaderValue::from_static("0"))?;
                res.set_status(StatusCode::NO_CONTENT)
            });

        match applied {
            Err(e) => next.fail(e),
            Ok(()) if preflight => res.end(),
            Ok(()) => next.proceed(),
        }
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::permissive()
    }
}

impl Middleware for Cors {
    fn call(&self, req: RawRequest, res: RawResponse, next: Next) -> BoxFuture<'static, ()> {
        Box::pin(self.clone().run(req, res, next))
    }

    fn name(&self) -> &'static str {
        "cors"
    }
}
