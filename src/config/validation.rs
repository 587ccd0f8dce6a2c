//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, body limit > 0)
//! - Check addresses parse and mount prefixes are well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::chain::path::normalize_prefix;
use crate::config::schema::{BridgeConfig, MountConfig};

/// A single semantic problem in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check `config` for semantic errors, collecting all of them.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.request.body_limit == 0 {
        errors.push(ValidationError::new("request.body_limit", "must be greater than 0"));
    }
    if let Some(name) = &config.request.request_id_header {
        if HeaderName::try_from(name.as_str()).is_err() {
            errors.push(ValidationError::new(
                "request.request_id_header",
                format!("'{name}' is not a valid header name"),
            ));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    for (i, mount) in config.mounts.iter().enumerate() {
        let field = format!("mounts[{i}]");
        if let Err(e) = normalize_prefix(mount.prefix()) {
            errors.push(ValidationError::new(format!("{field}.prefix"), e.to_string()));
        }
        match mount {
            MountConfig::Cors { allow_origin, .. } if allow_origin.is_empty() => {
                errors.push(ValidationError::new(format!("{field}.allow_origin"), "must not be empty"));
            }
            MountConfig::Static { file, .. } if file.as_os_str().is_empty() => {
                errors.push(ValidationError::new(format!("{field}.file"), "must not be empty"));
            }
            _ => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
