//! The plain request view handed to classic handlers.
//!
//! # Responsibilities
//! - Carry the request line and headers moved out of the host request
//! - Expose the enhancement fields a bare-server handler expects
//! - Hold the mutable property bag handlers read and write
//! - Rewrite the URL while a prefixed entry runs
//!
//! # Design Decisions
//! - Cheap to clone: every clone is the same request
//! - The property bag keeps a baseline taken at projection so the bridge can
//!   copy back only what handlers added or changed
//! - `body` stays absent unless the host parsed it before the chain ran

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::Span;

use super::Props;
use crate::chain::path;

/// Fields the host computed before the chain runs, projected onto the plain
/// request.
#[derive(Debug, Clone, Default)]
pub struct Enhancement {
    pub id: String,
    pub protocol: String,
    pub ip: Option<IpAddr>,
    pub ips: Vec<IpAddr>,
    pub hostname: Option<String>,
    pub query: Props,
    pub body: Option<Value>,
}

/// Mutable request shared by every handler of one exchange.
#[derive(Clone)]
pub struct RawRequest {
    shared: Arc<Mutex<RequestState>>,
}

struct RequestState {
    method: Method,
    version: Version,
    url: String,
    original_url: String,
    saved_url: Option<String>,
    headers: HeaderMap,
    enhancement: Option<Enhancement>,
    props: Props,
    baseline: Props,
    span: Span,
}

impl RawRequest {
    /// Create a bare request with no headers, enhancement or properties.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self::from_parts(method, Version::HTTP_11, url.into(), HeaderMap::new(), Span::none())
    }

    pub(crate) fn from_parts(
        method: Method,
        version: Version,
        url: String,
        headers: HeaderMap,
        span: Span,
    ) -> Self {
        Self {
            shared: Arc::new(Mutex::new(RequestState {
                method,
                version,
                original_url: url.clone(),
                url,
                saved_url: None,
                headers,
                enhancement: None,
                props: Props::new(),
                baseline: Props::new(),
                span,
            })),
        }
    }

    /// Attach host-computed fields and the decorated side's existing
    /// properties. The properties become the reconciliation baseline.
    pub(crate) fn enhance(&self, enhancement: Enhancement, locals: Props) {
        let mut state = self.shared.lock();
        state.enhancement = Some(enhancement);
        state.baseline = locals.clone();
        state.props = locals;
    }

    pub fn method(&self) -> Method {
        self.shared.lock().method.clone()
    }

    pub fn version(&self) -> Version {
        self.shared.lock().version
    }

    /// The URL (path and query) as the current entry sees it.
    pub fn url(&self) -> String {
        self.shared.lock().url.clone()
    }

    /// Replace the URL seen by this and later entries.
    pub fn set_url(&self, url: impl Into<String>) {
        self.shared.lock().url = url.into();
    }

    /// The URL before any prefix was stripped.
    pub fn original_url(&self) -> String {
        self.shared.lock().original_url.clone()
    }

    /// Path component of [`url`](Self::url).
    pub fn path(&self) -> String {
        let state = self.shared.lock();
        match state.url.split_once('?') {
            Some((path, _)) => path.to_string(),
            None => state.url.clone(),
        }
    }

    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.shared.lock().headers.get(name).cloned()
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.shared.lock().headers.insert(name, value);
    }

    pub fn remove_header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.shared.lock().headers.remove(name)
    }

    /// Snapshot of the request headers.
    pub fn headers(&self) -> HeaderMap {
        self.shared.lock().headers.clone()
    }

    /// Returns true once the bridge projected host fields onto this request.
    pub fn is_enhanced(&self) -> bool {
        self.shared.lock().enhancement.is_some()
    }

    pub fn id(&self) -> Option<String> {
        self.with_enhancement(|e| e.id.clone())
    }

    pub fn protocol(&self) -> Option<String> {
        self.with_enhancement(|e| e.protocol.clone())
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.with_enhancement(|e| e.ip).flatten()
    }

    pub fn ips(&self) -> Vec<IpAddr> {
        self.with_enhancement(|e| e.ips.clone()).unwrap_or_default()
    }

    pub fn hostname(&self) -> Option<String> {
        self.with_enhancement(|e| e.hostname.clone()).flatten()
    }

    /// Parsed query string.
    pub fn query(&self) -> Option<Props> {
        self.with_enhancement(|e| e.query.clone())
    }

    /// Parsed body; `None` when the host had not parsed it yet.
    pub fn body(&self) -> Option<Value> {
        self.with_enhancement(|e| e.body.clone()).flatten()
    }

    /// Read a property.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.shared.lock().props.get(key).cloned()
    }

    /// Set a property, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.shared.lock().props.insert(key.into(), value.into())
    }

    /// Remove a property from the plain view.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.shared.lock().props.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.shared.lock().props.contains_key(key)
    }

    /// Snapshot of the property bag.
    pub fn props(&self) -> Props {
        self.shared.lock().props.clone()
    }

    /// Span for handler logging, scoped to this request.
    pub fn span(&self) -> Span {
        self.shared.lock().span.clone()
    }

    /// Properties added or changed since projection.
    pub(crate) fn changed_props(&self) -> Vec<(String, Value)> {
        let state = self.shared.lock();
        state
            .props
            .iter()
            .filter(|(key, value)| state.baseline.get(key.as_str()) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Show the entry mounted at `prefix` a URL relative to it.
    pub(crate) fn enter(&self, prefix: &str) {
        if prefix == path::ROOT {
            return;
        }
        let mut state = self.shared.lock();
        if let Some(stripped) = path::strip_prefix(prefix, &state.url) {
            let previous = std::mem::replace(&mut state.url, stripped);
            state.saved_url = Some(previous);
        }
    }

    /// Undo [`enter`](Self::enter) once the entry handed off.
    pub(crate) fn leave(&self) {
        let mut state = self.shared.lock();
        if let Some(saved) = state.saved_url.take() {
            state.url = saved;
        }
    }

    fn with_enhancement<T>(&self, f: impl FnOnce(&Enhancement) -> T) -> Option<T> {
        self.shared.lock().enhancement.as_ref().map(f)
    }
}

impl std::fmt::Debug for RawRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("RawRequest")
            .field("method", &state.method)
            .field("url", &state.url)
            .field("props", &state.props)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_request_has_no_enhancement() {
        let req = RawRequest::new(Method::GET, "/x?y=1");
        assert!(!req.is_enhanced());
        assert_eq!(req.id(), None);
        assert_eq!(req.body(), None);
        assert_eq!(req.query(), None);
        assert!(req.props().is_empty());
        assert_eq!(req.path(), "/x");
    }

    #[test]
    fn test_changed_props_against_baseline() {
        let req = RawRequest::new(Method::GET, "/");
        let mut locals = Props::new();
        locals.insert("kept".into(), json!(1));
        locals.insert("changed".into(), json!("old"));
        req.enhance(Enhancement::default(), locals);

        req.set("changed", "new");
        req.set("added", true);
        req.remove("kept");

        let mut changed = req.changed_props();
        changed.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            changed,
            vec![("added".to_string(), json!(true)), ("changed".to_string(), json!("new"))]
        );
    }

    #[test]
    fn test_enter_and_leave_prefix() {
        let req = RawRequest::new(Method::GET, "/prefix/inner?q=1");
        req.enter("/prefix");
        assert_eq!(req.url(), "/inner?q=1");
        assert_eq!(req.original_url(), "/prefix/inner?q=1");
        req.leave();
        assert_eq!(req.url(), "/prefix/inner?q=1");

        // Root entries see the URL untouched and keep their rewrites.
        req.enter("/");
        req.set_url("/rewritten");
        req.leave();
        assert_eq!(req.url(), "/rewritten");
    }
}
