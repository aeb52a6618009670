//! Items service library.
//!
//! A small CRUD service over an in-memory store, instrumented with
//! granularity-gated tracing and OpenTelemetry metrics.

pub mod config;
pub mod http;
pub mod items;
pub mod lifecycle;
pub mod observability;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::{Granularity, Telemetry};
