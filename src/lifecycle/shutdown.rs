//! Stop signal shared by the listener and the signal handler.
//!
//! Backed by a `watch` flag, so a server started after the stop
//! was requested still sees it and exits at once.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable handle that requests and observes a graceful stop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    flag: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self { flag: Arc::new(flag) }
    }

    /// Request a stop. Repeated calls are no-ops.
    pub fn trigger(&self) {
        if !self.flag.send_replace(true) {
            tracing::info!("graceful shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once a stop was requested, including before this call.
    pub async fn triggered(&self) {
        let mut rx = self.flag.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
