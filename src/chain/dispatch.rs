//! Per-request chain execution.
//!
//! # Responsibilities
//! - Select the entries whose prefix matches the request path
//! - Run them strictly one after another
//! - Settle each entry on its first terminal signal: `next` called,
//!   `next` failed, or response finalized
//! - Report a single outcome to the host
//!
//! # Design Decisions
//! - Handlers run as their own tasks, like callbacks on an event loop; the
//!   dispatcher only waits for signals and never awaits a handler that has
//!   already handed off
//! - Response finalization is a watch signal subscribed before the handler
//!   starts, so streaming handlers stop the chain without calling `next`
//! - The continuation is checked before finalization when both are ready,
//!   so the earlier signal wins
//! - Writing commits the response; a committed response stops the chain at
//!   the next entry boundary

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::Instrument;

use super::next::HandlerTask;
use super::{Entry, Next};
use crate::error::{BoxError, ChainError};
use crate::exchange::{Finish, RawRequest, RawResponse};

/// Result of one dispatch.
#[derive(Debug)]
pub enum ChainOutcome {
    /// Every matching entry proceeded; the response is still open.
    Continue,
    /// An entry finalized or started writing the response; the host must
    /// skip the rest of its pipeline.
    Stopped,
    /// An entry failed; the error is exactly what it passed to `next`.
    Failed(BoxError),
}

impl ChainOutcome {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ChainOutcome::Continue => "continue",
            ChainOutcome::Stopped => "stopped",
            ChainOutcome::Failed(_) => "failed",
        }
    }
}

/// How a single entry handed off.
enum Handoff {
    Proceeded,
    Finalized(Finish),
    Failed(BoxError),
}

/// The entries matching one request path, fixed for the whole dispatch.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    entries: Vec<Arc<Entry>>,
}

impl Chain {
    /// Filter `entries` down to those matching `path`, keeping their order.
    pub fn select(entries: &[Arc<Entry>], path: &str) -> Self {
        Self {
            entries: entries.iter().filter(|e| e.matches(path)).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    /// Run the chain to its outcome.
    pub async fn run(&self, req: RawRequest, res: RawResponse) -> ChainOutcome {
        for (index, entry) in self.entries.iter().enumerate() {
            // A handler that proceeded and then ended or wrote in the same
            // poll is caught here: its continuation is only released after
            // that poll. Finalization after an await is seen by the next
            // entry's dispatch instead, once that entry has started.
            if res.is_committed() {
                tracing::debug!(index, "response committed before entry ran");
                return ChainOutcome::Stopped;
            }

            req.enter(entry.prefix());
            let handoff = run_entry(index, entry, &req, &res).await;
            req.leave();

            match handoff {
                Handoff::Proceeded => continue,
                Handoff::Finalized(finish) => {
                    tracing::debug!(index, ?finish, "response finalized, chain stopped");
                    return ChainOutcome::Stopped;
                }
                Handoff::Failed(err) => {
                    tracing::debug!(index, error = %err, "middleware failed, chain aborted");
                    return ChainOutcome::Failed(err);
                }
            }
        }
        if res.is_committed() {
            tracing::debug!("response committed by the last entry");
            return ChainOutcome::Stopped;
        }
        ChainOutcome::Continue
    }
}

/// Select the entries matching the request path and run them.
///
/// An empty selection resolves `Continue` without touching `req` or `res`.
pub async fn dispatch(entries: &[Arc<Entry>], req: RawRequest, res: RawResponse) -> ChainOutcome {
    let chain = Chain::select(entries, &req.path());
    if chain.is_empty() {
        return ChainOutcome::Continue;
    }
    chain.run(req, res).await
}

async fn run_entry(index: usize, entry: &Entry, req: &RawRequest, res: &RawResponse) -> Handoff {
    let (tx, mut rx) = oneshot::channel();
    let next = Next::new(tx, res.clone());

    let span = tracing::debug_span!(
        parent: &req.span(),
        "entry",
        index,
        prefix = %entry.prefix(),
        handler = entry.handler().name(),
    );
    let handler = HandlerTask::new(entry.handler().call(req.clone(), res.clone(), next));
    let mut task = tokio::spawn(handler.instrument(span));

    let mut continuation_open = true;
    let mut task_running = true;
    loop {
        tokio::select! {
            biased;
            signal = &mut rx, if continuation_open => match signal {
                Ok(Ok(())) => return Handoff::Proceeded,
                Ok(Err(err)) => return Handoff::Failed(err),
                Err(_) => {
                    continuation_open = false;
                    tracing::warn!(
                        index,
                        prefix = %entry.prefix(),
                        "middleware dropped its continuation; waiting for the response to finish"
                    );
                }
            },
            finish = res.finished() => return Handoff::Finalized(finish),
            joined = &mut task, if task_running => {
                task_running = false;
                if let Err(err) = joined {
                    if err.is_panic() {
                        tracing::error!(index, prefix = %entry.prefix(), "middleware panicked");
                        return Handoff::Failed(Box::new(ChainError::HandlerPanicked {
                            index,
                            prefix: entry.prefix().to_string(),
                        }));
                    }
                }
            }
        }
    }
}
