//! HTTP server setup.
//!
//! # Responsibilities
//! - Wrap the application routes with the host pipeline
//! - Install the middleware chain at the configured phase
//! - Serve with connect info and graceful shutdown
//!
//! # Pipeline (outermost first)
//! ```text
//! TraceLayer → TimeoutLayer → decorate
//!     → onRequest/preParsing:    chain → parse body → routes
//!     → preValidation/preHandler: parse body → chain → routes
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware::from_fn_with_state, Router};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::body::parse_body;
use super::decorate::decorate_request;
use super::error::ErrorHandler;
use super::hook::{run_chain, ChainState};
use crate::chain::ChainStack;
use crate::config::BridgeConfig;
use crate::lifecycle::Shutdown;

/// HTTP server hosting routes behind the middleware chain.
pub struct HttpServer {
    config: BridgeConfig,
    routes: Router,
    chain: ChainState,
}

impl HttpServer {
    /// Create a server for `routes`, running `stack` at the configured phase.
    pub fn new(config: BridgeConfig, stack: ChainStack, routes: Router) -> Self {
        Self {
            config,
            routes,
            chain: ChainState::new(stack),
        }
    }

    /// Replace the handler answering failed chains.
    pub fn with_error_handler(mut self, errors: impl ErrorHandler) -> Self {
        self.chain = self.chain.with_error_handler(errors);
        self
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Build the full application router.
    pub fn into_router(self) -> Router {
        let request = &self.config.request;
        let hook = self.config.middleware.hook;
        let chain = from_fn_with_state(self.chain, run_chain);
        let body = from_fn_with_state(request.body_limit, parse_body);

        let routes = if hook.body_parsed() {
            self.routes.layer(chain).layer(body)
        } else {
            self.routes.layer(body).layer(chain)
        };

        tracing::debug!(?hook, body_limit = request.body_limit, "host pipeline assembled");

        #[allow(deprecated)]
        let timeout = TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs));
        routes
            .layer(from_fn_with_state(Arc::new(request.clone()), decorate_request))
            .layer(timeout)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve on `listener` until `shutdown` is triggered, then drain
    /// in-flight requests, streamed bodies included.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, hook = ?self.config.middleware.hook, "HTTP server starting");

        let app = self.into_router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.triggered().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
