//! Response construction.
//!
//! # Responsibilities
//! - Serialize item payloads as JSON with the right status
//! - Stamp the `Trace-Id` header for client-side correlation
//! - Map item errors to HTTP status codes (404 / 409 / 500)
//!
//! # Design Decisions
//! - The trace id is captured while the handler span is still active, since
//!   `IntoResponse` runs after the span has ended

use std::any::Any;
use std::fmt;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::items::ItemError;
use crate::observability::Telemetry;

pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("trace-id");

fn with_trace_id(mut response: Response, trace_id: Option<&str>) -> Response {
    if let Some(value) = trace_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

/// A successful JSON response.
pub struct ApiResponse<T> {
    status: StatusCode,
    body: T,
    trace_id: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(telemetry: &Telemetry, status: StatusCode, body: T) -> Self {
        Self {
            status,
            body,
            trace_id: telemetry.current_trace_id(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let response = (self.status, Json(self.body)).into_response();
        with_trace_id(response, self.trace_id.as_deref())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(rename = "trace-id")]
    trace_id: Option<&'a str>,
}

/// An error returned to the client as `{"error": ..., "trace-id": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    trace_id: Option<String>,
}

impl ApiError {
    pub fn new(telemetry: &Telemetry, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            trace_id: telemetry.current_trace_id(),
        }
    }

    pub fn from_item_error(telemetry: &Telemetry, err: ItemError) -> Self {
        let status = match err {
            ItemError::NotFound(_) => StatusCode::NOT_FOUND,
            ItemError::AlreadyExists(_) => StatusCode::CONFLICT,
        };
        Self::new(telemetry, status, err.to_string())
    }

    /// A 500 built from a handler panic payload.
    pub fn from_panic(telemetry: &Telemetry, panic: Box<dyn Any + Send + 'static>) -> Self {
        let message = if let Some(message) = panic.downcast_ref::<String>() {
            message.clone()
        } else if let Some(message) = panic.downcast_ref::<&str>() {
            message.to_string()
        } else {
            "internal server error".to_string()
        };
        Self::new(telemetry, StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "Request failed");
        } else {
            tracing::warn!(status = %self.status, error = %self.message, "Request rejected");
        }

        let body = ErrorBody {
            error: &self.message,
            trace_id: self.trace_id.as_deref(),
        };
        let response = (self.status, Json(body)).into_response();
        with_trace_id(response, self.trace_id.as_deref())
    }
}
