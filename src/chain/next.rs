//! The continuation handed to each handler.
//!
//! `proceed` called from inside a handler's own task is held until the
//! handler yields, so a synchronous `next.proceed(); res.end();` reaches the
//! dispatcher with the end already visible.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

use crate::error::BoxError;
use crate::exchange::RawResponse;

type Continuation = oneshot::Sender<Result<(), BoxError>>;

tokio::task_local! {
    static HELD: RefCell<Vec<Continuation>>;
}

/// Hands control to the next entry, or aborts the chain with an error.
///
/// Consumed on use, so a handler can signal at most once. Signals arriving
/// after the response was finalized are ignored: finalization already
/// decided the outcome.
pub struct Next {
    tx: Continuation,
    res: RawResponse,
}

impl Next {
    pub(crate) fn new(tx: Continuation, res: RawResponse) -> Self {
        Self { tx, res }
    }

    /// Continue with the next entry.
    pub fn proceed(self) {
        self.settle(Ok(()));
    }

    /// Abort the chain; the error reaches the host unchanged.
    pub fn fail(self, err: impl Into<BoxError>) {
        self.settle(Err(err.into()));
    }

    /// Proceed on `Ok`, fail on `Err`.
    pub fn settle(self, result: Result<(), BoxError>) {
        if self.res.is_finished() {
            tracing::trace!(failed = result.is_err(), "continuation ignored, response already finalized");
            return;
        }
        let tx = match result {
            Ok(()) => match hold(self.tx) {
                Some(tx) => tx,
                None => return,
            },
            Err(err) => return send(self.tx, Err(err)),
        };
        send(tx, Ok(()));
    }
}

/// Park `tx` in the running handler's slot. Hands it back when called
/// outside a handler task.
fn hold(tx: Continuation) -> Option<Continuation> {
    let mut slot = Some(tx);
    let _ = HELD.try_with(|held| {
        if let Some(tx) = slot.take() {
            held.borrow_mut().push(tx);
        }
    });
    slot
}

fn send(tx: Continuation, result: Result<(), BoxError>) {
    if tx.send(result).is_err() {
        tracing::trace!("continuation ignored, chain already resolved");
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("response_finished", &self.res.is_finished())
            .finish_non_exhaustive()
    }
}

/// Drives a handler future, releasing held continuations after each poll.
pub(crate) struct HandlerTask {
    inner: BoxFuture<'static, ()>,
}

impl HandlerTask {
    pub(crate) fn new(inner: BoxFuture<'static, ()>) -> Self {
        Self { inner }
    }
}

impl Future for HandlerTask {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let inner = &mut self.inner;
        let (poll, held) = HELD.sync_scope(RefCell::new(Vec::new()), || {
            let poll = inner.as_mut().poll(cx);
            (poll, HELD.with(RefCell::take))
        });
        for tx in held {
            send(tx, Ok(()));
        }
        poll
    }
}
