//! Middleware chain engine.
//!
//! # Data Flow
//! ```text
//! Registration (any time):
//!     append(prefix, handler)
//!     → path.rs (normalize prefix)
//!     → stack.rs (publish new snapshot)
//!
//! Per request:
//!     snapshot → Chain::select(path) (matching entries, in order)
//!     → dispatch.rs (run each entry until it proceeds, fails,
//!       or the response is finalized)
//!     → ChainOutcome::{Continue, Stopped, Failed}
//! ```
//!
//! # Design Decisions
//! - Handlers keep the bare-server shape `(req, res, next)`
//! - Finalization is observed on the response, never inferred from `next`
//! - Handler errors are returned as-is; classification belongs to the host

pub mod dispatch;
pub mod next;
pub mod path;
pub mod stack;

use std::future::Future;

use futures_util::future::BoxFuture;

use crate::exchange::{RawRequest, RawResponse};

pub use dispatch::{dispatch, Chain, ChainOutcome};
pub use next::Next;
pub use stack::{ChainStack, Entry, Snapshot};

/// A classic `(request, response, next)` handler.
///
/// Implemented for every `Fn(RawRequest, RawResponse, Next) -> impl Future`,
/// so plain `async fn`s and closures can be appended directly.
pub trait Middleware: Send + Sync + 'static {
    /// Run the handler. It must eventually call `next` or finalize `res`.
    fn call(&self, req: RawRequest, res: RawResponse, next: Next) -> BoxFuture<'static, ()>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F, Fut> Middleware for F
where
    F: Fn(RawRequest, RawResponse, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, req: RawRequest, res: RawResponse, next: Next) -> BoxFuture<'static, ()> {
        Box::pin((self)(req, res, next))
    }
}
