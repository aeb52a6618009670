//! Telemetry error types.

use thiserror::Error;

/// Errors produced by the telemetry subsystem.
///
/// Only `InvalidConfiguration`, `AlreadyInitialized`, `Exporter` and `Logging`
/// ever reach a caller, and only during startup. `InstrumentCallback` is built
/// for logging inside the export loop and never propagated.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid telemetry configuration: {0}")]
    InvalidConfiguration(String),

    #[error("telemetry has already been installed for this process")]
    AlreadyInitialized,

    #[error("failed to build {pipeline} exporter: {reason}")]
    Exporter {
        pipeline: &'static str,
        reason: String,
    },

    #[error("callback for instrument '{instrument}' failed: {reason}")]
    InstrumentCallback { instrument: String, reason: String },

    #[error("failed to install log subscriber: {0}")]
    Logging(String),

    #[error("telemetry shutdown failed: {0}")]
    Shutdown(String),
}

impl TelemetryError {
    pub(crate) fn exporter(pipeline: &'static str, err: impl std::fmt::Display) -> Self {
        TelemetryError::Exporter {
            pipeline,
            reason: err.to_string(),
        }
    }
}
