//! Error types raised by the chain engine itself.
//!
//! Handler errors are not represented here: whatever a handler passes to
//! [`Next::fail`](crate::chain::Next::fail) travels as a [`BoxError`] and is
//! handed to the host untouched.

use thiserror::Error;

/// Type-erased error carried from a handler to the host.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors originating in the chain engine.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A prefix passed to `append` is structurally invalid.
    #[error("malformed middleware prefix {prefix:?}: {reason}")]
    MalformedPrefix {
        prefix: String,
        reason: &'static str,
    },

    /// A handler task panicked before handing off.
    #[error("middleware #{index} mounted at {prefix:?} panicked before handing off")]
    HandlerPanicked { index: usize, prefix: String },
}

/// Errors returned to handlers by the plain response sink.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The response was already ended or aborted.
    #[error("response already finalized")]
    Finalized,

    /// Status and headers went out with the first body bytes.
    #[error("headers already sent")]
    HeadersSent,

    /// The body channel is full; `send` waits for capacity instead.
    #[error("response body buffer is full")]
    Full,

    /// The client stopped reading; the response was aborted.
    #[error("response aborted")]
    Aborted,

    /// A stream piped into the response yielded an error.
    #[error("piped source stream failed: {0}")]
    Stream(#[source] BoxError),
}
