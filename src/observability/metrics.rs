//! Metrics registry.
//!
//! # Responsibilities
//! - Create counters and histograms once per name and hand out the cached instrument
//! - Register observable gauges/counters backed by polling callbacks
//! - Isolate callback failures so one bad instrument never breaks an export tick
//!
//! # Instruments
//! - Counters (`get_or_create_counter`): deduplicated by name
//! - Histograms (`get_or_create_histogram`): deduplicated by name
//! - Observables (`register_observable`): NOT deduplicated; every registration
//!   keeps its own callback, repeat names are logged as a warning
//!
//! # Design Decisions
//! - Get-or-create goes through a `DashMap` entry, so racing first callers for
//!   the same name retain a single instrument
//! - Callbacks run on the periodic reader's schedule, off the request path

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use opentelemetry::metrics::{
    AsyncInstrument, Counter as OtelCounter, Histogram, Meter, ObservableCounter,
    ObservableGauge,
};
use opentelemetry::KeyValue;

use crate::observability::error::TelemetryError;

/// Error a polling callback may return.
pub type PollError = Box<dyn std::error::Error + Send + Sync>;

/// Result of one poll.
pub type PollResult = Result<Reading, PollError>;

/// Value(s) produced by one poll of an observable instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Single(f64),
    Many(Vec<f64>),
}

impl Reading {
    pub fn values(&self) -> &[f64] {
        match self {
            Reading::Single(value) => std::slice::from_ref(value),
            Reading::Many(values) => values,
        }
    }
}

impl From<f64> for Reading {
    fn from(value: f64) -> Self {
        Reading::Single(value)
    }
}

impl From<f32> for Reading {
    fn from(value: f32) -> Self {
        Reading::Single(f64::from(value))
    }
}

impl From<u64> for Reading {
    fn from(value: u64) -> Self {
        Reading::Single(value as f64)
    }
}

impl From<Vec<f64>> for Reading {
    fn from(values: Vec<f64>) -> Self {
        Reading::Many(values)
    }
}

/// Flavor of an observable instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservableKind {
    Gauge,
    Counter,
}

/// A named, monotonic counter.
pub struct Counter {
    name: String,
    inner: OtelCounter<u64>,
}

impl Counter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, value: u64) {
        self.inner.add(value, &[]);
    }

    pub fn add_with(&self, value: u64, attributes: &[KeyValue]) {
        self.inner.add(value, attributes);
    }
}

/// Keeps an observable registration alive for the lifetime of the registry.
#[allow(dead_code)]
enum ObservableHandle {
    Gauge(ObservableGauge<f64>),
    Counter(ObservableCounter<f64>),
}

/// Registry of named instruments on a single meter.
pub struct MetricsRegistry {
    meter: Meter,
    counters: DashMap<String, Arc<Counter>>,
    histograms: DashMap<String, Histogram<f64>>,
    observables: DashMap<String, Vec<ObservableHandle>>,
}

impl MetricsRegistry {
    pub fn new(meter: Meter) -> Self {
        Self {
            meter,
            counters: DashMap::new(),
            histograms: DashMap::new(),
            observables: DashMap::new(),
        }
    }

    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    /// Return the counter named `name`, creating it on first use.
    ///
    /// `unit` and `description` only apply to the first creation.
    pub fn get_or_create_counter(&self, name: &str, unit: &str, description: &str) -> Arc<Counter> {
        if let Some(existing) = self.counters.get(name) {
            return existing.clone();
        }

        self.counters
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(instrument = %name, unit = %unit, "Creating counter");
                let inner = self
                    .meter
                    .u64_counter(name.to_string())
                    .with_unit(unit.to_string())
                    .with_description(description.to_string())
                    .build();
                Arc::new(Counter {
                    name: name.to_string(),
                    inner,
                })
            })
            .clone()
    }

    /// Return the histogram named `name`, creating it on first use.
    pub fn get_or_create_histogram(&self, name: &str, unit: &str, description: &str) -> Histogram<f64> {
        if let Some(existing) = self.histograms.get(name) {
            return existing.clone();
        }

        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(instrument = %name, unit = %unit, "Creating histogram");
                self.meter
                    .f64_histogram(name.to_string())
                    .with_unit(unit.to_string())
                    .with_description(description.to_string())
                    .build()
            })
            .clone()
    }

    /// Register an instrument whose values come from `poll` on every export tick.
    ///
    /// Each value in the reading becomes one observation without attributes.
    /// Registering the same name twice keeps both callbacks.
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
        let instrument = name.to_string();
        let callback = move |observer: &dyn AsyncInstrument<f64>| {
            if let Some(reading) = poll_isolated(&instrument, &poll) {
                for value in reading.values() {
                    observer.observe(*value, &[]);
                }
            }
        };

        let handle = match kind {
            ObservableKind::Gauge => ObservableHandle::Gauge(
                self.meter
                    .f64_observable_gauge(name.to_string())
                    .with_unit(unit.to_string())
                    .with_description(description.to_string())
                    .with_callback(callback)
                    .build(),
            ),
            ObservableKind::Counter => ObservableHandle::Counter(
                self.meter
                    .f64_observable_counter(name.to_string())
                    .with_unit(unit.to_string())
                    .with_description(description.to_string())
                    .with_callback(callback)
                    .build(),
            ),
        };

        let mut registrations = self.observables.entry(name.to_string()).or_default();
        registrations.push(handle);
        if registrations.len() > 1 {
            tracing::warn!(
                instrument = %name,
                registrations = registrations.len(),
                "Observable instrument registered more than once; every callback reports under this name"
            );
        } else {
            tracing::debug!(instrument = %name, kind = ?kind, "Registered observable instrument");
        }
    }

    /// Number of observable registrations under `name`.
    pub fn observable_registrations(&self, name: &str) -> usize {
        self.observables.get(name).map(|r| r.len()).unwrap_or(0)
    }
}

/// Run one poll, turning errors and panics into a logged skip.
fn poll_isolated<F>(instrument: &str, poll: &F) -> Option<Reading>
where
    F: Fn() -> PollResult,
{
    let reason = match catch_unwind(AssertUnwindSafe(poll)) {
        Ok(Ok(reading)) => return Some(reading),
        Ok(Err(err)) => err.to_string(),
        Err(_) => "callback panicked".to_string(),
    };

    let err = TelemetryError::InstrumentCallback {
        instrument: instrument.to_string(),
        reason,
    };
    tracing::warn!(error = %err, "Skipping observation for this export tick");
    None
}
