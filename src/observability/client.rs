//! Telemetry client: composition root of the observability subsystem.
//!
//! # Data Flow
//! ```text
//! TelemetryConfig
//!     → resource (service.name)
//!     → trace pipeline:   TracerProvider + BatchSpanProcessor → OTLP/gRPC
//!     → metrics pipeline: SdkMeterProvider + PeriodicReader  → OTLP/gRPC
//!     → logs pipeline:    LoggerProvider + batch processor   → OTLP/gRPC
//!     → Telemetry handle (cloned into every component)
//! ```
//!
//! # Design Decisions
//! - The handle is passed explicitly; call sites never read global state
//! - `install` is latched: a second process-wide install is refused
//! - A disabled handle turns every operation into a no-op

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::metrics::{Histogram, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::logs::{Logger, LoggerProvider};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};

use crate::config::TelemetryConfig;
use crate::observability::error::TelemetryError;
use crate::observability::granularity::Granularity;
use crate::observability::metrics::{Counter, MetricsRegistry, ObservableKind, PollResult};
use crate::observability::trace::SpanEmitter;

/// Instrumentation scope name for tracer and meter.
pub const INSTRUMENTATION_SCOPE: &str = "items-service";

static INSTALLED: AtomicBool = AtomicBool::new(false);

struct TelemetryInner {
    service_name: String,
    endpoint: Option<String>,
    headers: BTreeMap<String, String>,
    excluded_paths: Vec<String>,
    spans: SpanEmitter,
    metrics: Arc<MetricsRegistry>,
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    logger_provider: Option<LoggerProvider>,
}

/// Handle to the telemetry subsystem.
///
/// Cheap to clone; every clone shares the same providers and registry.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<TelemetryInner>,
}

impl Telemetry {
    /// A handle with no pipelines: no spans, no trace ids, metrics go nowhere.
    pub fn disabled() -> Self {
        Self::from_providers("disabled", Granularity::None, None, SdkMeterProvider::default())
    }

    /// Assemble a handle from providers built by the caller.
    pub fn from_providers(
        service_name: impl Into<String>,
        granularity: Granularity,
        tracer_provider: Option<TracerProvider>,
        meter_provider: SdkMeterProvider,
    ) -> Self {
        let tracer = tracer_provider
            .as_ref()
            .map(|provider| provider.tracer(INSTRUMENTATION_SCOPE));
        let meter = meter_provider.meter(INSTRUMENTATION_SCOPE);

        Self {
            inner: Arc::new(TelemetryInner {
                service_name: service_name.into(),
                endpoint: None,
                headers: BTreeMap::new(),
                excluded_paths: Vec::new(),
                spans: SpanEmitter::new(tracer, granularity),
                metrics: Arc::new(MetricsRegistry::new(meter)),
                tracer_provider,
                meter_provider,
                logger_provider: None,
            }),
        }
    }

    /// Build the OTLP trace, metrics and (optionally) log pipelines.
    ///
    /// Must run inside a Tokio runtime. Nothing is registered globally.
    pub fn initialize(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        if config.service_name.trim().is_empty() {
            return Err(TelemetryError::InvalidConfiguration(
                "service name is required".to_string(),
            ));
        }
        if config.endpoint.trim().is_empty() {
            return Err(TelemetryError::InvalidConfiguration(
                "exporter endpoint is required".to_string(),
            ));
        }

        let resource = Resource::default().merge(&Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]));
        let metadata = metadata_from_headers(&config.headers)?;

        let tracer_provider = init_traces(config, resource.clone(), metadata.clone())?;
        let meter_provider = init_metrics(config, resource.clone(), metadata.clone())?;
        let logger_provider = if config.logs_enabled {
            Some(init_logs(config, resource, metadata)?)
        } else {
            None
        };

        let tracer = tracer_provider.tracer(INSTRUMENTATION_SCOPE);
        let meter = meter_provider.meter(INSTRUMENTATION_SCOPE);

        Ok(Self {
            inner: Arc::new(TelemetryInner {
                service_name: config.service_name.clone(),
                endpoint: Some(config.endpoint.clone()),
                headers: config.headers.clone(),
                excluded_paths: config.excluded_urls.clone(),
                spans: SpanEmitter::new(Some(tracer), config.granularity),
                metrics: Arc::new(MetricsRegistry::new(meter)),
                tracer_provider: Some(tracer_provider),
                meter_provider,
                logger_provider,
            }),
        })
    }

    /// Initialize once per process and register the providers globally.
    ///
    /// A second call fails with [`TelemetryError::AlreadyInitialized`] instead
    /// of replacing providers that other components may already hold.
    pub fn install(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        if INSTALLED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TelemetryError::AlreadyInitialized);
        }

        let telemetry = match Self::initialize(config) {
            Ok(telemetry) => telemetry,
            Err(err) => {
                INSTALLED.store(false, Ordering::Release);
                return Err(err);
            }
        };

        if let Some(provider) = &telemetry.inner.tracer_provider {
            let _ = global::set_tracer_provider(provider.clone());
        }
        global::set_meter_provider(telemetry.inner.meter_provider.clone());

        Ok(telemetry)
    }

    /// Replace the set of URL paths excluded from request instrumentation.
    pub fn with_excluded_paths(self, paths: Vec<String>) -> Self {
        let inner = TelemetryInner {
            service_name: self.inner.service_name.clone(),
            endpoint: self.inner.endpoint.clone(),
            headers: self.inner.headers.clone(),
            excluded_paths: paths,
            spans: self.inner.spans.clone(),
            metrics: self.inner.metrics.clone(),
            tracer_provider: self.inner.tracer_provider.clone(),
            meter_provider: self.inner.meter_provider.clone(),
            logger_provider: self.inner.logger_provider.clone(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.inner.endpoint.as_deref()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.inner.headers
    }

    pub fn granularity(&self) -> Granularity {
        self.inner.spans.granularity()
    }

    pub fn spans(&self) -> &SpanEmitter {
        &self.inner.spans
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.inner.metrics
    }

    /// Whether `path` is excluded from request instrumentation.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.inner.excluded_paths.iter().any(|p| p == path)
    }

    pub fn wrap<T>(
        &self,
        name: impl Into<Cow<'static, str>>,
        granularity: Granularity,
        attributes: impl IntoIterator<Item = KeyValue>,
        work: impl FnOnce() -> T,
    ) -> T {
        self.inner.spans.wrap(name, granularity, attributes, work)
    }

    pub fn try_wrap<T, E: Display>(
        &self,
        name: impl Into<Cow<'static, str>>,
        granularity: Granularity,
        attributes: impl IntoIterator<Item = KeyValue>,
        work: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        self.inner.spans.try_wrap(name, granularity, attributes, work)
    }

    pub async fn wrap_async<F: Future>(
        &self,
        name: impl Into<Cow<'static, str>>,
        granularity: Granularity,
        attributes: impl IntoIterator<Item = KeyValue>,
        work: F,
    ) -> F::Output {
        self.inner
            .spans
            .wrap_async(name, granularity, attributes, work)
            .await
    }

    pub async fn try_wrap_async<T, E, F>(
        &self,
        name: impl Into<Cow<'static, str>>,
        granularity: Granularity,
        attributes: impl IntoIterator<Item = KeyValue>,
        work: F,
    ) -> Result<T, E>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        self.inner
            .spans
            .try_wrap_async(name, granularity, attributes, work)
            .await
    }

    pub fn add_attributes_to_current_span(&self, attributes: impl IntoIterator<Item = KeyValue>) {
        self.inner.spans.add_attributes_to_current_span(attributes);
    }

    pub fn current_trace_id(&self) -> Option<String> {
        self.inner.spans.current_trace_id()
    }

    pub fn get_or_create_counter(&self, name: &str, unit: &str, description: &str) -> Arc<Counter> {
        self.inner.metrics.get_or_create_counter(name, unit, description)
    }

    pub fn get_or_create_histogram(&self, name: &str, unit: &str, description: &str) -> Histogram<f64> {
        self.inner.metrics.get_or_create_histogram(name, unit, description)
    }

    pub fn register_observable<F>(
        &self,
        name: &str,
        unit: &str,
        description: &str,
        kind: ObservableKind,
        poll: F,
    ) where
        F: Fn() -> PollResult + Send + Sync + 'static,
    {
        self.inner
            .metrics
            .register_observable(name, unit, description, kind, poll);
    }

    /// Tracing layer forwarding log events to the collector, when logs are enabled.
    pub fn log_bridge(&self) -> Option<OpenTelemetryTracingBridge<LoggerProvider, Logger>> {
        self.inner
            .logger_provider
            .as_ref()
            .map(OpenTelemetryTracingBridge::new)
    }

    /// Flush and shut down every pipeline. Blocks until exporters finish.
    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        let mut failures = Vec::new();

        if let Some(provider) = &self.inner.tracer_provider {
            if let Err(e) = provider.shutdown() {
                failures.push(format!("traces: {}", e));
            }
        }
        if let Err(e) = self.inner.meter_provider.shutdown() {
            failures.push(format!("metrics: {}", e));
        }
        if let Some(provider) = &self.inner.logger_provider {
            if let Err(e) = provider.shutdown() {
                failures.push(format!("logs: {}", e));
            }
        }

        if failures.is_empty() {
            tracing::info!(service = %self.inner.service_name, "Telemetry shut down");
            Ok(())
        } else {
            Err(TelemetryError::Shutdown(failures.join(", ")))
        }
    }
}

fn metadata_from_headers(headers: &BTreeMap<String, String>) -> Result<MetadataMap, TelemetryError> {
    let mut metadata = MetadataMap::new();
    for (name, value) in headers {
        let key = MetadataKey::from_bytes(name.to_ascii_lowercase().as_bytes()).map_err(|_| {
            TelemetryError::InvalidConfiguration(format!("invalid exporter header name '{}'", name))
        })?;
        let value = MetadataValue::try_from(value.as_str()).map_err(|_| {
            TelemetryError::InvalidConfiguration(format!("invalid value for exporter header '{}'", name))
        })?;
        metadata.insert(key, value);
    }
    Ok(metadata)
}

fn init_traces(
    config: &TelemetryConfig,
    resource: Resource,
    metadata: MetadataMap,
) -> Result<TracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.clone())
        .with_metadata(metadata)
        .build()
        .map_err(|e| TelemetryError::exporter("span", e))?;

    let batch_config = BatchConfigBuilder::default()
        .with_scheduled_delay(Duration::from_millis(config.export_interval_ms))
        .build();

    let processor = BatchSpanProcessor::builder(exporter, runtime::Tokio)
        .with_batch_config(batch_config)
        .build();

    Ok(TracerProvider::builder()
        .with_span_processor(processor)
        .with_resource(resource)
        .build())
}

fn init_metrics(
    config: &TelemetryConfig,
    resource: Resource,
    metadata: MetadataMap,
) -> Result<SdkMeterProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.clone())
        .with_metadata(metadata)
        .build()
        .map_err(|e| TelemetryError::exporter("metric", e))?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(Duration::from_millis(config.export_interval_ms))
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build())
}

fn init_logs(
    config: &TelemetryConfig,
    resource: Resource,
    metadata: MetadataMap,
) -> Result<LoggerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.clone())
        .with_metadata(metadata)
        .build()
        .map_err(|e| TelemetryError::exporter("log", e))?;

    Ok(LoggerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build())
}
