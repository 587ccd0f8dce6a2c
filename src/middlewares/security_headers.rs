//! Hardening response headers.

use axum::http::{HeaderName, HeaderValue};
use futures_util::future::BoxFuture;

use crate::chain::{Middleware, Next};
use crate::exchange::{RawRequest, RawResponse};

const HEADERS: &[(&str, &str)] = &[
    ("x-dns-prefetch-control", "off"),
    ("x-frame-options", "SAMEORIGIN"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-download-options", "noopen"),
    ("x-content-type-options", "nosniff"),
    ("x-xss-protection", "0"),
    ("referrer-policy", "no-referrer"),
    ("cross-origin-opener-policy", "same-origin"),
];

/// Sets a fixed set of security headers, then proceeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityHeaders;

impl SecurityHeaders {
    async fn run(res: RawResponse, next: Next) {
        for &(name, value) in HEADERS {
            let applied = res.set_header(HeaderName::from_static(name), HeaderValue::from_static(value));
            if let Err(e) = applied {
                next.fail(e);
                return;
            }
        }
        next.proceed();
    }
}

impl Middleware for SecurityHeaders {
    fn call(&self, _req: RawRequest, res: RawResponse, next: Next) -> BoxFuture<'static, ()> {
        Box::pin(Self::run(res, next))
    }

    fn name(&self) -> &'static str {
        "security_headers"
    }
}
