//! Inbound request instrumentation.
//!
//! # Responsibilities
//! - Continue a W3C trace started by the caller (`traceparent`)
//! - Open one SERVER span per request, gated at API granularity
//! - Record request duration and count per method, route and status
//! - Leave excluded paths (health checks) completely uninstrumented
//! - Count requests dropped before a response exists (client disconnects)
//!
//! # Design Decisions
//! - Spans are named by the matched route template, not the raw path, to keep
//!   span names and metric attributes low-cardinality

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::{FutureExt as _, SpanKind};
use opentelemetry::KeyValue;
use opentelemetry_sdk::propagation::TraceContextPropagator;

use crate::http::request::RequestIdExt;
use crate::observability::{ActiveSpan, Granularity, Telemetry};

pub const REQUEST_DURATION: &str = "http.server.request.duration";
pub const REQUEST_COUNT: &str = "http.server.request.count";

/// Route attribute used when no route matched.
const UNMATCHED_ROUTE: &str = "unmatched";

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Attribute set on requests that were dropped before a response existed.
const CANCELLED: &str = "cancelled";

/// Per-request record, flushed to metrics when dropped.
///
/// A request whose future is dropped before `finish` (client gone, server
/// draining) is still counted, with `error.type` in place of a status code.
struct RequestRecord {
    telemetry: Telemetry,
    method: String,
    route: String,
    started: Instant,
    span: Option<ActiveSpan>,
    status: Option<StatusCode>,
}

impl RequestRecord {
    fn finish(&mut self, status: StatusCode) {
        if let Some(span) = &self.span {
            span.set_attributes([KeyValue::new(
                "http.response.status_code",
                i64::from(status.as_u16()),
            )]);
            if status.is_server_error() {
                span.mark_error(status);
            }
        }
        self.status = Some(status);
    }
}

impl Drop for RequestRecord {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let outcome = match self.status {
            Some(status) => KeyValue::new("http.response.status_code", i64::from(status.as_u16())),
            None => {
                if let Some(span) = &self.span {
                    span.set_attributes([KeyValue::new("error.type", CANCELLED)]);
                }
                tracing::debug!(method = %self.method, route = %self.route, "Request dropped before completion");
                KeyValue::new("error.type", CANCELLED)
            }
        };

        let labels = [
            KeyValue::new("http.request.method", self.method.clone()),
            KeyValue::new("http.route", self.route.clone()),
            outcome,
        ];
        self.telemetry
            .get_or_create_histogram(REQUEST_DURATION, "s", "Duration of inbound HTTP requests")
            .record(elapsed, &labels);
        self.telemetry
            .get_or_create_counter(REQUEST_COUNT, "1", "Inbound HTTP requests")
            .add_with(1, &labels);
    }
}

/// Wrap every request in a span and record request metrics.
pub async fn instrument_request(
    State(telemetry): State<Telemetry>,
    request: Request,
    next: Next,
) -> Response {
    if telemetry.is_excluded(request.uri().path()) {
        return next.run(request).await;
    }

    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

    let mut attributes = vec![
        KeyValue::new("http.request.method", method.clone()),
        KeyValue::new("http.route", route.clone()),
    ];
    if let Some(id) = request.request_id() {
        attributes.push(KeyValue::new("http.request.id", id.to_string()));
    }

    let parent = TraceContextPropagator::new().extract(&HeaderExtractor(request.headers()));
    let span = telemetry.spans().start(
        format!("{} {}", method, route),
        Granularity::Api,
        SpanKind::Server,
        attributes,
        &parent,
    );

    let cx = span.as_ref().map(|span| span.context().clone());
    let mut record = RequestRecord {
        telemetry,
        method,
        route,
        started: Instant::now(),
        span,
        status: None,
    };

    let response = match cx {
        Some(cx) => next.run(request).with_context(cx).await,
        None => next.run(request).await,
    };
    record.finish(response.status());

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use opentelemetry::trace::TraceContextExt;

    #[test]
    fn test_extracts_w3c_parent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            HeaderValue::from_static("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        );
        let cx = TraceContextPropagator::new().extract(&HeaderExtractor(&headers));
        let span_context = cx.span().span_context().clone();
        assert!(span_context.is_valid());
        assert_eq!(
            span_context.trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }

    #[test]
    fn test_missing_parent_is_invalid() {
        let headers = HeaderMap::new();
        let cx = TraceContextPropagator::new().extract(&HeaderExtractor(&headers));
        assert!(!cx.span().span_context().is_valid());
    }
}
