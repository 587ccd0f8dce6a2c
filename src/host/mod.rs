//! Host integration subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, connect info, shutdown)
//!     → decorate.rs (request ID, addresses, hostname, query)
//!     → hook.rs (middleware chain at the configured phase)
//!     → body.rs (body parsing, before or after the chain)
//!     → routes
//!     → error.rs (failed chains)
//! ```

pub mod body;
pub mod decorate;
pub mod error;
pub mod hook;
pub mod server;

pub use decorate::{Decorations, X_REQUEST_ID};
pub use error::{DefaultErrorHandler, ErrorHandler, HttpError};
pub use hook::{run_chain, ChainState};
pub use server::HttpServer;
