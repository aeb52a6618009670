//! Failure paths through the middleware stack: panics, timeouts, dropped requests.

use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use opentelemetry::trace::Status;
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::testing::metrics::InMemoryMetricExporter;
use tower::ServiceExt;

use items_service::config::ServiceConfig;
use items_service::http::TRACE_ID_HEADER;
use items_service::{Granularity, HttpServer, Telemetry};

mod common;

use common::{empty_request, send};

async fn corrupted() -> StatusCode {
    panic!("item table corrupted")
}

async fn stalled() -> StatusCode {
    tokio::time::sleep(Duration::from_secs(30)).await;
    StatusCode::OK
}

fn failing_router(telemetry: Telemetry, request_secs: u64) -> Router {
    let mut config = ServiceConfig::default();
    config.timeouts.request_secs = request_secs;
    let routes = Router::new()
        .route("/corrupted", get(corrupted))
        .route("/stalled", get(stalled));
    HttpServer::with_middleware(routes, &config, telemetry)
}

#[tokio::test]
async fn test_handler_panic_becomes_traced_500() {
    let (telemetry, exporter) = common::in_memory_telemetry(Granularity::Api);
    let router = failing_router(telemetry, 30);

    let (response, body) = send(&router, empty_request("GET", "/corrupted")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "item table corrupted");

    let header = response.headers().get(TRACE_ID_HEADER).unwrap().to_str().unwrap();
    assert_eq!(body["trace-id"], header);

    let spans = common::finished_spans(&exporter);
    let server = common::span_named(&spans, "GET /corrupted");
    assert!(matches!(server.status, Status::Error { .. }));
    assert!(server
        .attributes
        .contains(&KeyValue::new("http.response.status_code", 500_i64)));
    assert_eq!(header, server.span_context.trace_id().to_string());
}

#[tokio::test]
async fn test_panic_without_tracing_still_answers() {
    let router = failing_router(Telemetry::disabled(), 30);

    let (response, body) = send(&router, empty_request("GET", "/corrupted")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "item table corrupted");
    assert!(body["trace-id"].is_null());
    assert!(response.headers().get(TRACE_ID_HEADER).is_none());
}

#[tokio::test]
async fn test_timed_out_request_is_instrumented() {
    let (telemetry, exporter) = common::in_memory_telemetry(Granularity::Api);
    let router = failing_router(telemetry, 1);

    let (response, _) = send(&router, empty_request("GET", "/stalled")).await;
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

    let spans = common::finished_spans(&exporter);
    let server = common::span_named(&spans, "GET /stalled");
    assert!(server
        .attributes
        .contains(&KeyValue::new("http.response.status_code", 408_i64)));
    assert_eq!(server.status, Status::Unset);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_request_is_still_counted() {
    let metric_exporter = InMemoryMetricExporter::default();
    let reader = PeriodicReader::builder(metric_exporter.clone(), runtime::Tokio).build();
    let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();
    let (telemetry, exporter) =
        common::in_memory_telemetry_with_meter(Granularity::Api, meter_provider.clone());
    let router = failing_router(telemetry, 30);

    let pending = router.oneshot(empty_request("GET", "/stalled"));
    let dropped = tokio::time::timeout(Duration::from_millis(50), pending).await;
    assert!(dropped.is_err());

    let spans = common::finished_spans(&exporter);
    let server = common::span_named(&spans, "GET /stalled");
    assert!(server.attributes.contains(&KeyValue::new("error.type", "cancelled")));
    assert!(!server
        .attributes
        .iter()
        .any(|kv| kv.key.as_str() == "http.response.status_code"));

    let provider = meter_provider.clone();
    tokio::task::spawn_blocking(move || provider.force_flush())
        .await
        .unwrap()
        .unwrap();

    let names: Vec<String> = metric_exporter
        .get_finished_metrics()
        .unwrap()
        .iter()
        .flat_map(|rm| rm.scope_metrics.iter())
        .flat_map(|sm| sm.metrics.iter())
        .map(|m| m.name.to_string())
        .collect();
    assert!(names.iter().any(|n| n == "http.server.request.count"));
    assert!(names.iter().any(|n| n == "http.server.request.duration"));
}
