//! Structured logging.
//!
//! # Responsibilities
//! - Install the process-wide `tracing` subscriber
//! - Honor `RUST_LOG`, falling back to the configured level
//! - Forward log events to the collector when the log pipeline is enabled
//!
//! # Design Decisions
//! - Events from the exporter stack itself are never forwarded, so a failing
//!   export cannot feed back into the pipeline it is failing on

use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::observability::client::Telemetry;
use crate::observability::error::TelemetryError;

/// Target prefixes whose events stay local.
const LOCAL_ONLY_TARGETS: &[&str] = &["opentelemetry", "tonic", "h2", "hyper", "tower"];

fn forwardable(target: &str) -> bool {
    !LOCAL_ONLY_TARGETS.iter().any(|prefix| {
        target
            .strip_prefix(*prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::") || rest.starts_with('_'))
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(level: &str, telemetry: &Telemetry) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| TelemetryError::Logging(format!("invalid log level '{}': {}", level, e)))?;

    let bridge = telemetry
        .log_bridge()
        .map(|layer| layer.with_filter(filter_fn(|meta| forwardable(meta.target()))));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(bridge)
        .try_init()
        .map_err(|e| TelemetryError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_targets_stay_local() {
        assert!(!forwardable("opentelemetry_sdk::metrics"));
        assert!(!forwardable("tonic::transport"));
        assert!(!forwardable("h2"));
        assert!(!forwardable("tower_http::trace::on_response"));
        assert!(forwardable("items_service::http::server"));
        assert!(forwardable("hyperion"));
    }
}
