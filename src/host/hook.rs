//! The middleware chain as one phase of the host pipeline.
//!
//! # Responsibilities
//! - Select the entries for the request path from a fresh snapshot
//! - Skip projection entirely when nothing matches
//! - Map the chain outcome onto the host pipeline:
//!   Continue → next phase, Stopped → send the sink, Failed → error phase
//! - Hand the sink to the host as soon as a handler starts writing, and
//!   settle the chain in the background
//! - Carry headers set by proceeding middleware onto the final response
//!
//! # Design Decisions
//! - Installed with `axum::middleware::from_fn_with_state`, at the position
//!   the configured phase dictates
//! - Dropping the request future (client gone) aborts the plain response so
//!   handlers still running observe finalization
//! - A failure reported before the host sent anything always goes to the
//!   error handler, even if the handler also ended the response

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use super::error::{DefaultErrorHandler, ErrorHandler};
use crate::bridge;
use crate::chain::{Chain, ChainOutcome, ChainStack};
use crate::exchange::RawResponse;
use crate::observability::metrics;

/// State shared by every invocation of [`run_chain`].
#[derive(Clone)]
pub struct ChainState {
    stack: ChainStack,
    errors: Arc<dyn ErrorHandler>,
}

impl ChainState {
    pub fn new(stack: ChainStack) -> Self {
        Self {
            stack,
            errors: Arc::new(DefaultErrorHandler),
        }
    }

    /// Replace the handler answering failed chains.
    pub fn with_error_handler(mut self, errors: impl ErrorHandler) -> Self {
        self.errors = Arc::new(errors);
        self
    }

    pub fn stack(&self) -> &ChainStack {
        &self.stack
    }
}

/// Run the middleware chain for one request.
pub async fn run_chain(State(state): State<ChainState>, request: Request, next: Next) -> Response {
    let snapshot = state.stack.snapshot();
    let chain = Chain::select(&snapshot, request.uri().path());
    if chain.is_empty() {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let (req, res) = bridge::project(&mut parts);
    let span = req.span();
    let mut guard = AbortOnDrop(Some(res.clone()));

    let entries = chain.len();
    let started = Instant::now();
    let mut run = Box::pin(
        {
            let (req, res) = (req.clone(), res.clone());
            async move { chain.run(req, res).await }
        }
        .instrument(span.clone()),
    );

    let outcome = tokio::select! {
        biased;
        outcome = &mut run => outcome,
        _ = res.committed() => {
            // Headers are out; stream the body while the chain settles.
            guard.disarm();
            tokio::spawn(settle_streaming(run, res.clone(), entries, started).instrument(span));
            return res.take_response();
        }
    };
    guard.disarm();
    metrics::record_chain(outcome.label(), entries, started);
    span.in_scope(|| tracing::debug!(outcome = outcome.label(), entries, "middleware chain settled"));

    match outcome {
        ChainOutcome::Continue => {
            bridge::reconcile(&mut parts, &req);
            let pending = res.headers();
            let mut response = next.run(Request::from_parts(parts, body)).await;
            merge_headers(response.headers_mut(), pending);
            response
        }
        ChainOutcome::Stopped => res.take_response(),
        ChainOutcome::Failed(err) => {
            bridge::reconcile(&mut parts, &req);
            if res.is_finished() {
                span.in_scope(|| {
                    tracing::warn!(error = %err, "response finalized after the middleware failed; answering with the error")
                });
            }
            state.errors.handle(err, &parts)
        }
    }
}

/// Wait out a chain whose response is already streaming. A chain that fails
/// at this point can only cut the body short.
async fn settle_streaming<F>(run: F, res: RawResponse, entries: usize, started: Instant)
where
    F: Future<Output = ChainOutcome>,
{
    let outcome = run.await;
    metrics::record_chain(outcome.label(), entries, started);
    match outcome {
        ChainOutcome::Stopped => tracing::debug!(entries, "middleware chain settled while streaming"),
        ChainOutcome::Continue => {
            tracing::warn!("middleware proceeded after starting the response; ending it");
            res.end();
        }
        ChainOutcome::Failed(err) => {
            tracing::error!(error = %err, "middleware failed after starting the response; aborting it");
            res.abort();
        }
    }
}

/// Add headers a middleware set before proceeding, unless the later phases
/// set the same header themselves.
fn merge_headers(target: &mut HeaderMap, pending: HeaderMap) {
    let mut current = None;
    for (name, value) in pending {
        if let Some(name) = name {
            current = (!target.contains_key(&name)).then_some(name);
        }
        if let Some(name) = &current {
            target.append(name.clone(), value);
        }
    }
}

struct AbortOnDrop(Option<RawResponse>);

impl AbortOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(res) = self.0.take() {
            tracing::debug!("request dropped before the middleware chain settled");
            res.abort();
        }
    }
}
