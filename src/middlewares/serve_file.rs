//! Streaming file responder.
//!
//! Answers GET and HEAD with the contents of one file, streamed into the
//! response in chunks; other methods pass through. A missing file is
//! reported to the host as 404. Reads keep pace with the client: only a
//! bounded number of chunks is buffered at any time.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use futures_util::future::BoxFuture;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::chain::{Middleware, Next};
use crate::exchange::{RawRequest, RawResponse};
use crate::host::HttpError;

#[derive(Debug, Clone)]
pub struct ServeFile {
    path: Arc<PathBuf>,
    content_type: HeaderValue,
}

impl ServeFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            content_type: HeaderValue::from_static("application/octet-stream"),
        }
    }

    /// Set the `content-type` sent with the file.
    pub fn content_type(mut self, content_type: &str) -> Self {
        match HeaderValue::from_str(content_type) {
            Ok(value) => self.content_type = value,
            Err(_) => tracing::warn!(content_type, "invalid content type; keeping the previous one"),
        }
        self
    }

    async fn run(self, req: RawRequest, res: RawResponse, next: Next) {
        let method = req.method();
        if method != Method::GET && method != Method::HEAD {
            next.proceed();
            return;
        }

        let file = match File::open(self.path.as_path()).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                next.fail(HttpError::not_found(format!("{} not found", req.path())));
                return;
            }
            Err(e) => {
                next.fail(e);
                return;
            }
        };

        if let Err(e) = res.set_header(header::CONTENT_TYPE, self.content_type) {
            next.fail(e);
            return;
        }
        if method == Method::HEAD {
            res.end();
            return;
        }

        tracing::debug!(path = %self.path.display(), "streaming file");
        if let Err(e) = res.pipe(ReaderStream::new(file)).await {
            tracing::warn!(path = %self.path.display(), error = %e, "file stream failed");
            if res.is_committed() {
                res.abort();
            } else {
                next.fail(e);
            }
        }
    }
}

impl Middleware for ServeFile {
    fn call(&self, req: RawRequest, res: RawResponse, next: Next) -> BoxFuture<'static, ()> {
        Box::pin(self.clone().run(req, res, next))
    }

    fn name(&self) -> &'static str {
        "serve_file"
    }
}
