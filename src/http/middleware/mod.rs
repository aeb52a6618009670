//! HTTP middleware.

pub mod telemetry;

pub use telemetry::instrument_request;
