//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Handlers / services / store
//!     → trace.rs    (granularity-gated spans)
//!     → metrics.rs  (counters, histograms, observable instruments)
//!     → system.rs   (process and host resource gauges)
//!     → logging.rs  (structured log events)
//!
//! client.rs owns the providers and exports everything over OTLP/gRPC.
//! ```
//!
//! # Design Decisions
//! - One `Telemetry` handle is built at startup and cloned into components
//! - Granularity is fixed for the life of the process
//! - Telemetry failures are logged, never surfaced to request handlers

pub mod client;
pub mod error;
pub mod granularity;
pub mod logging;
pub mod metrics;
pub mod system;
pub mod trace;

pub use client::Telemetry;
pub use error::TelemetryError;
pub use granularity::Granularity;
pub use logging::init_logging;
pub use metrics::{Counter, MetricsRegistry, ObservableKind, PollResult, Reading};
pub use system::register_resource_instruments;
pub use trace::{ActiveSpan, SpanEmitter, GRANULARITY_ATTRIBUTE};
