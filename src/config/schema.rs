//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Every field
//! has a default, so an empty file is a valid configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::observability::Granularity;

/// Root configuration for the items service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Telemetry export settings.
    pub telemetry: TelemetryConfig,
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

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Reported as the `service.name` resource attribute.
    pub service_name: String,

    /// OTLP/gRPC collector endpoint.
    pub endpoint: String,

    /// Extra metadata sent with every export (e.g. auth tokens).
    pub headers: BTreeMap<String, String>,

    /// Which layers of the call stack produce spans.
    pub granularity: Granularity,

    /// Export interval for the metrics reader and span batches.
    pub export_interval_ms: u64,

    /// Request paths never instrumented (exact match).
    pub excluded_urls: Vec<String>,

    /// Forward log events to the collector.
    pub logs_enabled: bool,

    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "item-service".to_string(),
            endpoint: "http://localhost:4317".to_string(),
            headers: BTreeMap::new(),
            granularity: Granularity::All,
            export_interval_ms: 1000,
            excluded_urls: vec!["/healthz".to_string()],
            logs_enabled: true,
            log_level: "info".to_string(),
        }
    }
}
