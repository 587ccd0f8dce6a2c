//! Projection and reconciliation between the host request and the plain
//! request handlers mutate.
//!
//! # Data Flow
//! ```text
//! Parts + Decorations ──project──▶ RawRequest + RawResponse
//!        ▲                               │ (chain runs)
//!        └──────────reconcile────────────┘
//! ```
//!
//! # Design Decisions
//! - Request line and headers move into the plain view and are written back;
//!   they are never edited on both sides at once
//! - The property bag is diffed against a baseline taken at projection, so
//!   host-side properties the chain never touched survive unchanged
//! - Only called when at least one entry will run

use axum::http::request::Parts;

use crate::exchange::{Enhancement, RawRequest, RawResponse};
use crate::host::Decorations;

/// Build the plain views handlers receive.
pub fn project(parts: &mut Parts) -> (RawRequest, RawResponse) {
    let decorations = parts.extensions.get::<Decorations>().cloned().unwrap_or_default();
    let span = tracing::debug_span!("middleware", request_id = %decorations.id);

    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let req = RawRequest::from_parts(
        parts.method.clone(),
        parts.version,
        url,
        std::mem::take(&mut parts.headers),
        span.clone(),
    );

    let Decorations {
        id,
        protocol,
        ip,
        ips,
        hostname,
        query,
        body,
        locals,
    } = decorations;
    req.enhance(
        Enhancement {
            id,
            protocol,
            ip,
            ips,
            hostname,
            query,
            body,
        },
        locals,
    );

    (req, RawResponse::with_span(span))
}

/// Copy the chain's effects on the plain request back onto the host request.
pub fn reconcile(parts: &mut Parts, req: &RawRequest) {
    parts.headers = req.headers();

    let changed = req.changed_props();
    if changed.is_empty() {
        return;
    }
    if parts.extensions.get::<Decorations>().is_none() {
        parts.extensions.insert(Decorations::default());
    }
    if let Some(decorations) = parts.extensions.get_mut::<Decorations>() {
        for (key, value) in changed {
            tracing::trace!(key = %key, "property reconciled");
            decorations.locals.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, Request};
    use serde_json::json;

    fn decorated(uri: &str) -> Parts {
        let (mut parts, ()) = Request::builder()
            .uri(uri)
            .header("x-original", "1")
            .body(())
            .unwrap()
            .into_parts();
        let mut decorations = Decorations {
            id: "req-1".into(),
            protocol: "http".into(),
            ip: Some("127.0.0.1".parse().unwrap()),
            hostname: Some("localhost".into()),
            ..Decorations::default()
        };
        decorations.query.insert("foo".into(), json!("bar"));
        decorations.set_local("untouched", "host");
        decorations.set_local("overwritten", "host");
        decorations.set_local("removed", "host");
        parts.extensions.insert(decorations);
        parts
    }

    #[test]
    fn test_project_exposes_decorations() {
        let mut parts = decorated("/a/b?foo=bar");
        let (req, res) = project(&mut parts);

        assert_eq!(req.url(), "/a/b?foo=bar");
        assert_eq!(req.id().as_deref(), Some("req-1"));
        assert_eq!(req.protocol().as_deref(), Some("http"));
        assert_eq!(req.ip(), Some("127.0.0.1".parse().unwrap()));
        assert_eq!(req.hostname().as_deref(), Some("localhost"));
        assert_eq!(req.query().unwrap()["foo"], json!("bar"));
        assert_eq!(req.body(), None);
        assert_eq!(req.header(&HeaderName::from_static("x-original")).unwrap(), "1");
        assert_eq!(req.get("untouched"), Some(json!("host")));
        assert!(!res.is_finished());
    }

    #[test]
    fn test_reconcile_copies_only_changes() {
        let mut parts = decorated("/");
        let (req, _res) = project(&mut parts);

        req.set("added", 1);
        req.set("overwritten", "plain");
        req.remove("removed");
        req.set_header(HeaderName::from_static("x-added"), HeaderValue::from_static("yes"));

        reconcile(&mut parts, &req);
        let decorations = parts.extensions.get::<Decorations>().unwrap();
        assert_eq!(decorations.local("added"), Some(&json!(1)));
        assert_eq!(decorations.local("overwritten"), Some(&json!("plain")));
        assert_eq!(decorations.local("untouched"), Some(&json!("host")));
        assert_eq!(decorations.local("removed"), Some(&json!("host")));
        assert_eq!(parts.headers["x-added"], "yes");
        assert_eq!(parts.headers["x-original"], "1");
    }

    #[test]
    fn test_reconcile_without_decorations() {
        let (mut parts, ()) = Request::builder().uri("/").body(()).unwrap().into_parts();
        let (req, _res) = project(&mut parts);
        req.set("a", 1);

        reconcile(&mut parts, &req);
        assert_eq!(parts.extensions.get::<Decorations>().unwrap().local("a"), Some(&json!(1)));
    }
}
