//! Request decoration.
//!
//! # Responsibilities
//! - Assign a request ID (configured header or UUID v4)
//! - Resolve client address, forwarded address chain, hostname, protocol
//! - Parse the query string
//! - Echo the request ID on the response
//!
//! # Design Decisions
//! - Runs before any lifecycle phase so every phase sees the same fields
//! - `x-forwarded-*` headers are ignored unless `trust_proxy` is set
//! - Repeated query keys collapse into arrays

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::RequestConfig;
use crate::exchange::Props;

/// Header carrying the request ID on responses.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Host-computed fields attached to every request as an extension.
///
/// `locals` is the host side of the property bag handlers write; chain runs
/// copy their additions into it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Decorations {
    pub id: String,
    pub protocol: String,
    pub ip: Option<IpAddr>,
    pub ips: Vec<IpAddr>,
    pub hostname: Option<String>,
    pub query: Props,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    pub locals: Props,
}

impl Decorations {
    /// Read a property set by an earlier phase or by the middleware chain.
    pub fn local(&self, key: &str) -> Option<&Value> {
        self.locals.get(key)
    }

    pub fn set_local(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.locals.insert(key.into(), value.into())
    }
}

/// Decorate the request, then echo its ID on the response.
pub async fn decorate_request(
    State(config): State<Arc<RequestConfig>>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let decorations = decorate(&config, request.headers(), request.uri(), peer);
    let id = HeaderValue::from_str(&decorations.id).ok();

    tracing::trace!(request_id = %decorations.id, ip = ?decorations.ip, "request decorated");
    request.extensions_mut().insert(decorations);

    let mut response = next.run(request).await;
    if let Some(id) = id {
        response.headers_mut().entry(X_REQUEST_ID).or_insert(id);
    }
    response
}

/// Compute decorations from the request line, headers and peer address.
pub fn decorate(
    config: &RequestConfig,
    headers: &HeaderMap,
    uri: &axum::http::Uri,
    peer: Option<IpAddr>,
) -> Decorations {
    let id = config
        .request_id_header
        .as_deref()
        .and_then(|name| header_str(headers, name))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (ip, ips) = if config.trust_proxy {
        let mut chain: Vec<IpAddr> = peer.into_iter().collect();
        if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
            let hops: Vec<IpAddr> = forwarded
                .split(',')
                .filter_map(|hop| hop.trim().parse().ok())
                .collect();
            chain.extend(hops.into_iter().rev());
        }
        (chain.last().copied(), chain)
    } else {
        (peer, Vec::new())
    };

    let forwarded = |name| config.trust_proxy.then(|| header_str(headers, name)).flatten();
    let hostname = forwarded("x-forwarded-host")
        .or_else(|| header_str(headers, header::HOST.as_str()))
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.to_string()));
    let protocol = forwarded("x-forwarded-proto")
        .and_then(|p| p.split(',').next())
        .map(|p| p.trim().to_string())
        .or_else(|| uri.scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string());

    Decorations {
        id,
        protocol,
        ip,
        ips,
        hostname,
        query: parse_query(uri.query().unwrap_or_default()),
        body: None,
        locals: Props::new(),
    }
}

/// Parse a query string into a property bag.
pub fn parse_query(query: &str) -> Props {
    let mut props = Props::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match props.get_mut(&*key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                props.insert(key.into_owned(), value);
            }
        }
    }
    props
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
