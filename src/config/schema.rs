//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// How incoming requests are decorated and parsed.
    pub request: RequestConfig,

    /// Where the middleware chain runs.
    pub middleware: ChainConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Built-in middlewares appended in file order.
    pub mounts: Vec<MountConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Request decoration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Honor `x-forwarded-for`, `x-forwarded-host` and `x-forwarded-proto`.
    pub trust_proxy: bool,

    /// Incoming header whose value becomes the request id.
    pub request_id_header: Option<String>,

    /// Maximum buffered body size in bytes.
    pub body_limit: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            trust_proxy: false,
            request_id_header: None,
            body_limit: 1024 * 1024,
        }
    }
}

/// Middleware chain placement.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ChainConfig {
    /// Host phase the chain runs in.
    pub hook: Phase,
}

/// Host pipeline phases the chain can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    OnRequest,
    PreParsing,
    PreValidation,
    PreHandler,
}

impl Phase {
    /// Whether the body has been parsed by the time this phase runs.
    pub fn body_parsed(self) -> bool {
        matches!(self, Phase::PreValidation | Phase::PreHandler)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A built-in middleware mounted under a prefix.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MountConfig {
    /// CORS headers and preflight answers.
    Cors {
        #[serde(default = "root_prefix")]
        prefix: String,
        #[serde(default = "any_origin")]
        allow_origin: String,
    },
    /// Hardening response headers.
    SecurityHeaders {
        #[serde(default = "root_prefix")]
        prefix: String,
    },
    /// A single file served for every request under the prefix.
    Static {
        prefix: String,
        file: PathBuf,
        #[serde(default = "octet_stream")]
        content_type: String,
    },
}

impl MountConfig {
    pub fn prefix(&self) -> &str {
        match self {
            MountConfig::Cors { prefix, .. }
            | MountConfig::SecurityHeaders { prefix }
            | MountConfig::Static { prefix, .. } => prefix,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MountConfig::Cors { .. } => "cors",
            MountConfig::SecurityHeaders { .. } => "security_headers",
            MountConfig::Static { .. } => "static",
        }
    }
}

fn root_prefix() -> String {
    "/".to_string()
}

fn any_origin() -> String {
    "*".to_string()
}

fn octet_stream() -> String {
    "application/octet-stream".to_string()
}
