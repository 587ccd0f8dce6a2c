//! The plain response sink handed to classic handlers.
//!
//! # Responsibilities
//! - Hold status and headers until the first body bytes commit them
//! - Stream body chunks to the host through a bounded channel
//! - Track finalization (ended, piped stream complete, connection aborted)
//! - Publish commit and finalization as signals the host and dispatcher wait on
//!
//! # Design Decisions
//! - Cheap to clone: every clone is the same sink
//! - Commit and finalization live in `watch` channels so late subscribers still see them
//! - Writes after finalization are rejected, never silently dropped
//! - `write` never blocks and reports a full channel; `send` and `pipe` wait for capacity
//!
//! # Data Flow
//! ```text
//! write/send/pipe → mpsc (BODY_CHANNEL_CAPACITY) → take_response body stream → client
//!                 ↘ committed watch (host hands the response out)
//! end/abort       → finish watch (dispatcher), channel closed
//! ```

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use bytes::Bytes;
use futures_util::{pin_mut, Stream, StreamExt};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::Span;

use crate::error::{BoxError, ResponseError};

/// Chunks buffered between handlers and the host body.
const BODY_CHANNEL_CAPACITY: usize = 32;

/// How a response reached its final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// A handler ended the response, directly or through a piped stream.
    Ended,
    /// The exchange was abandoned (connection closed) before an end.
    Aborted,
}

/// Writable, endable output sink shared by every handler of one request.
#[derive(Clone)]
pub struct RawResponse {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<SinkState>,
    committed: watch::Sender<bool>,
    finish: watch::Sender<Option<Finish>>,
    span: Span,
}

struct SinkState {
    status: StatusCode,
    headers: HeaderMap,
    body_tx: Option<mpsc::Sender<Bytes>>,
    body_rx: Option<mpsc::Receiver<Bytes>>,
    written: usize,
}

impl RawResponse {
    /// Create an open response with status 200 and no headers.
    pub fn new() -> Self {
        Self::with_span(Span::none())
    }

    /// Create an open response logging into `span`.
    pub fn with_span(span: Span) -> Self {
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let (committed, _) = watch::channel(false);
        let (finish, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SinkState {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body_tx: Some(body_tx),
                    body_rx: Some(body_rx),
                    written: 0,
                }),
                committed,
                finish,
                span,
            }),
        }
    }

    /// Span for handler logging, scoped to this request.
    pub fn span(&self) -> Span {
        self.shared.span.clone()
    }

    /// Current status code.
    pub fn status(&self) -> StatusCode {
        self.shared.state.lock().status
    }

    /// Set the status code.
    pub fn set_status(&self, status: StatusCode) -> Result<(), ResponseError> {
        let mut state = self.header_state()?;
        state.status = status;
        Ok(())
    }

    /// Current value of a header.
    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.shared.state.lock().headers.get(name).cloned()
    }

    /// Replace a header.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) -> Result<(), ResponseError> {
        let mut state = self.header_state()?;
        state.headers.insert(name, value);
        Ok(())
    }

    /// Append a header value, keeping existing ones.
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) -> Result<(), ResponseError> {
        let mut state = self.header_state()?;
        state.headers.append(name, value);
        Ok(())
    }

    /// Remove a header, returning its previous value.
    pub fn remove_header(&self, name: &HeaderName) -> Result<Option<HeaderValue>, ResponseError> {
        let mut state = self.header_state()?;
        Ok(state.headers.remove(name))
    }

    /// Snapshot of the headers set so far.
    pub fn headers(&self) -> HeaderMap {
        self.shared.state.lock().headers.clone()
    }

    /// Queue a body chunk without waiting. Commits status and headers.
    ///
    /// Fails with [`ResponseError::Full`] when the client is not keeping up;
    /// use [`send`](Self::send) to wait for room instead.
    pub fn write(&self, chunk: impl Into<Bytes>) -> Result<(), ResponseError> {
        let chunk = chunk.into();
        let result = {
            let mut state = self.open_state()?;
            self.push(&mut state, chunk)
        };
        if matches!(result, Err(ResponseError::Aborted)) {
            self.abort();
        }
        result
    }

    /// Queue a body chunk, waiting for channel capacity.
    pub async fn send(&self, chunk: impl Into<Bytes>) -> Result<(), ResponseError> {
        let chunk = chunk.into();
        let len = chunk.len();
        let tx = {
            let state = self.open_state()?;
            state.body_tx.clone().ok_or(ResponseError::Finalized)?
        };
        // Commit first: the host only starts draining once it sees the commit.
        self.commit();
        if tx.send(chunk).await.is_err() {
            self.abort();
            return Err(ResponseError::Aborted);
        }
        self.shared.state.lock().written += len;
        Ok(())
    }

    /// Number of body bytes written so far.
    pub fn written(&self) -> usize {
        self.shared.state.lock().written
    }

    /// Finalize the response. Ending twice is a no-op.
    pub fn end(&self) {
        self.finalize(Finish::Ended);
    }

    /// Write a last chunk and finalize.
    pub fn end_with(&self, chunk: impl Into<Bytes>) -> Result<(), ResponseError> {
        let chunk = chunk.into();
        let mut state = self.open_state()?;
        let result = self.push(&mut state, chunk);
        let finish = match result {
            Err(ResponseError::Full) => return result,
            Err(_) => Finish::Aborted,
            Ok(()) => Finish::Ended,
        };
        self.finalize_locked(&mut state, finish);
        result
    }

    /// Mark the exchange abandoned. No-op if already finalized.
    pub fn abort(&self) {
        self.finalize(Finish::Aborted);
    }

    /// Stream a byte source into the body and end the response when the
    /// source reaches its natural end.
    ///
    /// A failing source leaves the response open so the handler can decide
    /// what to do with it.
    pub async fn pipe<S, E>(&self, stream: S) -> Result<(), ResponseError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<BoxError>,
    {
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ResponseError::Stream(e.into()))?;
            self.send(chunk).await?;
        }
        self.end();
        Ok(())
    }

    /// Returns true once status and headers are fixed: the first body chunk
    /// was queued, the response was finalized or handed to the host.
    pub fn is_committed(&self) -> bool {
        *self.shared.committed.borrow()
    }

    /// Resolves once the response is committed.
    pub async fn committed(&self) {
        let mut rx = self.shared.committed.subscribe();
        let _ = rx.wait_for(|committed| *committed).await;
    }

    /// Returns true once the response was ended or aborted.
    pub fn is_finished(&self) -> bool {
        self.shared.finish.borrow().is_some()
    }

    /// How the response was finalized, if it was.
    pub fn finish_state(&self) -> Option<Finish> {
        *self.shared.finish.borrow()
    }

    /// Resolves once the response is finalized.
    pub async fn finished(&self) -> Finish {
        let mut rx = self.shared.finish.subscribe();
        rx.wait_for(Option::is_some)
            .await
            .map(|state| *state)
            .ok()
            .flatten()
            .unwrap_or(Finish::Aborted)
    }

    /// Build the host response. The body streams whatever handlers write,
    /// now or later, and completes when the response is ended.
    ///
    /// Only the first call gets the body; later calls get an empty one.
    pub fn take_response(&self) -> Response<Body> {
        let (status, headers, body_rx) = {
            let mut state = self.shared.state.lock();
            (state.status, state.headers.clone(), state.body_rx.take())
        };
        self.commit();

        let body = match body_rx {
            Some(rx) => Body::from_stream(self.body_stream(rx)),
            None => Body::empty(),
        };
        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    fn body_stream(
        &self,
        rx: mpsc::Receiver<Bytes>,
    ) -> impl Stream<Item = Result<Bytes, ResponseError>> + Send + 'static {
        let res = self.clone();
        futures_util::stream::unfold(Some(rx), move |rx| {
            let res = res.clone();
            async move {
                let mut rx = rx?;
                match rx.recv().await {
                    Some(chunk) => Some((Ok(chunk), Some(rx))),
                    // An aborted response must not look complete to the client.
                    None if res.finish_state() == Some(Finish::Aborted) => Some((Err(ResponseError::Aborted), None)),
                    None => None,
                }
            }
        })
    }

    fn open_state(&self) -> Result<MutexGuard<'_, SinkState>, ResponseError> {
        let state = self.shared.state.lock();
        if self.is_finished() {
            return Err(ResponseError::Finalized);
        }
        Ok(state)
    }

    fn header_state(&self) -> Result<MutexGuard<'_, SinkState>, ResponseError> {
        let state = self.open_state()?;
        if self.is_committed() {
            return Err(ResponseError::HeadersSent);
        }
        Ok(state)
    }

    fn push(&self, state: &mut SinkState, chunk: Bytes) -> Result<(), ResponseError> {
        let len = chunk.len();
        let Some(tx) = state.body_tx.as_ref() else {
            return Err(ResponseError::Finalized);
        };
        if len > 0 {
            match tx.try_send(chunk) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => return Err(ResponseError::Full),
                Err(TrySendError::Closed(_)) => return Err(ResponseError::Aborted),
            }
        }
        state.written += len;
        self.commit();
        Ok(())
    }

    fn commit(&self) {
        self.shared.committed.send_if_modified(|committed| !std::mem::replace(committed, true));
    }

    fn finalize(&self, finish: Finish) {
        let mut state = self.shared.state.lock();
        self.finalize_locked(&mut state, finish);
    }

    fn finalize_locked(&self, state: &mut SinkState, finish: Finish) {
        let changed = self.shared.finish.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(finish);
            true
        });
        if changed {
            // Closing the channel completes the body stream after the queued chunks.
            state.body_tx = None;
            self.commit();
        }
    }
}

impl Default for RawResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status())
            .field("committed", &self.is_committed())
            .field("finish", &self.finish_state())
            .finish_non_exhaustive()
    }
}
