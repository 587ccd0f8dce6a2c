//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from `RUST_LOG` or config
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Installing twice is an error the caller may ignore (tests do)

use thiserror::Error;
use tracing_subscriber::{
    filter::ParseError, fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

use crate::config::{LogFormat, ObservabilityConfig};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("failed to install subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("{},tower_http={}", config.log_level, config.log_level))?,
    };

    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().flatten_event(true)))
        .with((!json).then(fmt::layer))
        .try_init()?;

    Ok(())
}
