//! Shared utilities for integration testing.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use serde_json::Value;
use tower::ServiceExt;

use items_service::config::ServiceConfig;
use items_service::{Granularity, HttpServer, Telemetry};

/// Telemetry exporting spans to memory, with `/healthz` excluded.
pub fn in_memory_telemetry(granularity: Granularity) -> (Telemetry, InMemorySpanExporter) {
    in_memory_telemetry_with_meter(granularity, SdkMeterProvider::default())
}

pub fn in_memory_telemetry_with_meter(
    granularity: Granularity,
    meter_provider: SdkMeterProvider,
) -> (Telemetry, InMemorySpanExporter) {
    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let telemetry = Telemetry::from_providers("items-test", granularity, Some(provider), meter_provider)
        .with_excluded_paths(vec!["/healthz".to_string()]);
    (telemetry, exporter)
}

#[allow(dead_code)]
pub fn router(telemetry: Telemetry) -> Router {
    HttpServer::new(ServiceConfig::default(), telemetry).router()
}

pub fn finished_spans(exporter: &InMemorySpanExporter) -> Vec<SpanData> {
    exporter.get_finished_spans().unwrap()
}

#[allow(dead_code)]
pub fn span_named<'a>(spans: &'a [SpanData], name: &str) -> &'a SpanData {
    spans
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no span named {}", name))
}

/// Send one request through the router and decode the body.
///
/// Non-JSON bodies come back as a JSON string.
#[allow(dead_code)]
pub async fn send(router: &Router, request: Request<Body>) -> (Response<Body>, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (Response::from_parts(parts, Body::empty()), json)
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[allow(dead_code)]
pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}
