//! Startup orchestration.
//!
//! # Responsibilities
//! - Install telemetry before anything can emit a span
//! - Initialize logging, then the resource instruments
//! - Bind the listener and serve until shutdown
//! - Flush telemetry once the server has drained
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{ConfigError, ServiceConfig};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_listener;
use crate::observability::{init_logging, register_resource_instruments, Telemetry, TelemetryError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Run the service until a termination signal arrives.
pub async fn run(config: ServiceConfig) -> Result<(), StartupError> {
    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());
    run_with_shutdown(config, shutdown).await
}

/// Run the service until `shutdown` is triggered.
pub async fn run_with_shutdown(config: ServiceConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let telemetry = Telemetry::install(&config.telemetry)?;
    init_logging(&config.telemetry.log_level, &telemetry)?;

    tracing::info!(
        service = %telemetry.service_name(),
        endpoint = %config.telemetry.endpoint,
        granularity = %telemetry.granularity(),
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    register_resource_instruments(telemetry.metrics());

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, telemetry.clone());
    let served = server.run(listener, shutdown.wait()).await;

    flush(telemetry).await;
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Shut down the exporters off the async workers; provider shutdown blocks.
async fn flush(telemetry: Telemetry) {
    let outcome = tokio::task::spawn_blocking(move || telemetry.shutdown()).await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Telemetry flush failed"),
        Err(e) => tracing::warn!(error = %e, "Telemetry flush task failed"),
    }
}
