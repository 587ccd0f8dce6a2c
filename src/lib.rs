//! Classic `(req, res, next)` middleware chains inside an axum pipeline.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ host::decorate ──▶ [host::hook ⇄ host::body per phase] ──▶ routes
//!                                              │
//!                                              ▼
//!                     chain::stack (snapshot) ──▶ chain::dispatch
//!                                              │        │
//!                          bridge::project ◀───┘        ▼
//!                          bridge::reconcile ◀── exchange::{RawRequest, RawResponse}
//!                                              │
//!                                              ▼
//!                     Continue → next phase   Stopped → sink response   Failed → host::error
//! ```

// Chain engine
pub mod bridge;
pub mod chain;
pub mod error;
pub mod exchange;

// Host integration
pub mod host;
pub mod middlewares;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use chain::{ChainOutcome, ChainStack, Middleware, Next};
pub use config::BridgeConfig;
pub use error::{BoxError, ChainError, ResponseError};
pub use exchange::{RawRequest, RawResponse};
pub use host::{Decorations, HttpError, HttpServer};
pub use lifecycle::Shutdown;
