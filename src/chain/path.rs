//! Prefix normalization and matching.
//!
//! # Responsibilities
//! - Normalize registration prefixes (empty → root, trailing `/` stripped)
//! - Reject structurally invalid prefixes at registration time
//! - Match request paths on segment boundaries
//! - Compute the URL a prefixed entry sees
//!
//! # Design Decisions
//! - Pure functions, no state
//! - Case-sensitive, no regex (same as route prefix matching)
//! - `/prefix` never matches `/prefixed`

use crate::error::ChainError;

/// The root prefix, matching every path.
pub const ROOT: &str = "/";

/// Normalize a registration prefix.
pub fn normalize_prefix(prefix: &str) -> Result<String, ChainError> {
    let malformed = |reason| ChainError::MalformedPrefix {
        prefix: prefix.to_string(),
        reason,
    };

    if prefix.is_empty() {
        return Ok(ROOT.to_string());
    }
    if !prefix.starts_with('/') {
        return Err(malformed("must start with '/'"));
    }
    if prefix.contains(['?', '#']) {
        return Err(malformed("must not contain a query or fragment"));
    }
    if prefix.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(malformed("must not contain whitespace or control characters"));
    }

    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(ROOT.to_string());
    }
    if trimmed.contains("//") {
        return Err(malformed("must not contain empty segments"));
    }

    Ok(trimmed.to_string())
}

/// Returns true if `path` falls under the normalized `prefix`.
pub fn matches(prefix: &str, path: &str) -> bool {
    if prefix == ROOT {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// The URL (path and query) as seen from inside an entry mounted at `prefix`.
///
/// Returns `None` when the URL is not under the prefix.
pub fn strip_prefix(prefix: &str, url: &str) -> Option<String> {
    if prefix == ROOT {
        return Some(url.to_string());
    }
    let rest = url.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('?') {
        Some(format!("/{rest}"))
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}
