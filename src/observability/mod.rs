//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! host and chain produce:
//!     → logging.rs (structured log events, `middleware` span per request)
//!     → metrics.rs (chain counters and histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every chain span
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LoggingError};
pub use metrics::{init_metrics, record_chain};
