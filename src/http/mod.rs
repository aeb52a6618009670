//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID)
//!     → middleware/telemetry.rs (request span + metrics)
//!     → handlers.rs (API spans → item service)
//!     → response.rs (JSON body, Trace-Id header, error mapping)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use handlers::AppState;
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use response::{ApiError, ApiResponse, TRACE_ID_HEADER};
pub use server::HttpServer;
