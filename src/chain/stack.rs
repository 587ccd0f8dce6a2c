//! Append-only registration stack.
//!
//! # Responsibilities
//! - Normalize prefixes and store entries in registration order
//! - Hand out immutable per-request snapshots
//!
//! # Design Decisions
//! - Entries never change after append; no removal, no reordering
//! - Appends publish a new vector (read-copy-update); readers never lock
//! - A snapshot taken by a running request ignores later appends

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::path;
use super::Middleware;
use crate::error::ChainError;

/// One registered `(prefix, handler)` pair.
pub struct Entry {
    prefix: String,
    handler: Arc<dyn Middleware>,
}

impl Entry {
    /// Normalized prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn handler(&self) -> &Arc<dyn Middleware> {
        &self.handler
    }

    /// Returns true if this entry applies to `path`.
    pub fn matches(&self, path: &str) -> bool {
        path::matches(&self.prefix, path)
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("prefix", &self.prefix)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// Ordered entries as seen by one request.
pub type Snapshot = Arc<Vec<Arc<Entry>>>;

/// Append-only, cheaply cloneable stack of entries.
#[derive(Clone)]
pub struct ChainStack {
    entries: Arc<ArcSwap<Vec<Arc<Entry>>>>,
}

impl ChainStack {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(ArcSwap::from_pointee(Vec::new())),
        }
    }

    /// Register `handler` under `prefix` (empty string means root).
    pub fn append<M: Middleware>(&self, prefix: &str, handler: M) -> Result<&Self, ChainError> {
        let prefix = path::normalize_prefix(prefix)?;
        self.push(Entry {
            prefix,
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    /// Register `handler` for every path.
    pub fn append_global<M: Middleware>(&self, handler: M) -> &Self {
        self.push(Entry {
            prefix: path::ROOT.to_string(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Current entries in registration order.
    pub fn snapshot(&self) -> Snapshot {
        self.entries.load_full()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    fn push(&self, entry: Entry) {
        let entry = Arc::new(entry);
        tracing::debug!(prefix = %entry.prefix, handler = entry.handler.name(), "middleware appended");
        self.entries.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&entry));
            next
        });
    }
}

impl Default for ChainStack {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChainStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.load().iter()).finish()
    }
}
