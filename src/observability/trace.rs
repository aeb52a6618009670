//! Granularity-gated span emission.
//!
//! # Responsibilities
//! - Decide per call site whether a span is opened
//! - Run the unit of work with the span as the active context
//! - End the span on every exit path (return, error, panic, cancellation)
//!
//! # Design Decisions
//! - The active span lives in the OpenTelemetry `Context`, which is thread-local
//!   for sync work and carried by the future for async work
//! - The emitter never inspects or alters the work's output
//! - No tracer means every call runs untraced

use std::borrow::Cow;
use std::fmt::Display;
use std::future::Future;

use opentelemetry::trace::{FutureExt as _, SpanBuilder, SpanKind, Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::Tracer;

use crate::observability::granularity::Granularity;

/// Attribute key carrying the declared granularity of a call site.
pub const GRANULARITY_ATTRIBUTE: &str = "telemetry.granularity";

/// A span opened by the emitter.
///
/// Dropping it ends the span, so a cancelled future or an unwinding panic
/// still closes it.
pub struct ActiveSpan {
    cx: Context,
}

impl ActiveSpan {
    /// The context with this span as the current span.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn set_attributes(&self, attributes: impl IntoIterator<Item = KeyValue>) {
        self.cx.span().set_attributes(attributes);
    }

    /// Mark the span as failed without ending it.
    pub fn mark_error(&self, message: impl Display) {
        self.cx.span().set_status(Status::error(message.to_string()));
    }

    /// 32 lowercase hex digits.
    pub fn trace_id(&self) -> String {
        self.cx.span().span_context().trace_id().to_string()
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}

/// Wraps units of work in spans according to the configured granularity.
#[derive(Clone)]
pub struct SpanEmitter {
    tracer: Option<Tracer>,
    granularity: Granularity,
}

impl SpanEmitter {
    pub fn new(tracer: Option<Tracer>, granularity: Granularity) -> Self {
        Self {
            tracer,
            granularity,
        }
    }

    /// An emitter that never opens spans.
    pub fn disabled() -> Self {
        Self::new(None, Granularity::None)
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Whether a call site declared at `call` would be traced.
    pub fn should_trace(&self, call: Granularity) -> bool {
        if !call.admitted_by(self.granularity) {
            return false;
        }
        self.tracer.is_some()
    }

    fn is_enabled(&self) -> bool {
        self.granularity != Granularity::None && self.tracer.is_some()
    }

    /// Open a span as a child of `parent`, if the gate admits `call`.
    pub fn start(
        &self,
        name: impl Into<Cow<'static, str>>,
        call: Granularity,
        kind: SpanKind,
        attributes: impl IntoIterator<Item = KeyValue>,
        parent: &Context,
    ) -> Option<ActiveSpan> {
        if !self.should_trace(call) {
            return None;
        }
        let tracer = self.tracer.as_ref()?;

        let mut attributes: Vec<KeyValue> = attributes.into_iter().collect();
        attributes.push(KeyValue::new(GRANULARITY_ATTRIBUTE, call.as_str()));

        let span = SpanBuilder::from_name(name)
            .with_kind(kind)
            .with_attributes(attributes)
            .start_with_context(tracer, parent);

        Some(ActiveSpan {
            cx: parent.with_span(span),
        })
    }

    fn start_internal(
        &self,
        name: impl Into<Cow<'static, str>>,
        call: Granularity,
        attributes: impl IntoIterator<Item = KeyValue>,
    ) -> Option<ActiveSpan> {
        self.start(name, call, SpanKind::Internal, attributes, &Context::current())
    }

    /// Run `work`, inside a span when the gate admits `granularity`.
    pub fn wrap<T>(
        &self,
        name: impl Into<Cow<'static, str>>,
        granularity: Granularity,
        attributes: impl IntoIterator<Item = KeyValue>,
        work: impl FnOnce() -> T,
    ) -> T {
        match self.start_internal(name, granularity, attributes) {
            None => work(),
            Some(span) => {
                let _attached = span.context().clone().attach();
                work()
            }
        }
    }

    /// Like [`SpanEmitter::wrap`], marking the span as failed when `work` returns `Err`.
    pub fn try_wrap<T, E: Display>(
        &self,
        name: impl Into<Cow<'static, str>>,
        granularity: Granularity,
        attributes: impl IntoIterator<Item = KeyValue>,
        work: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        match self.start_internal(name, granularity, attributes) {
            None => work(),
            Some(span) => {
                let result = {
                    let _attached = span.context().clone().attach();
                    work()
                };
                if let Err(err) = &result {
                    span.mark_error(err);
                }
                result
            }
        }
    }

    /// Await `work`, inside a span when the gate admits `granularity`.
    ///
    /// The span ends when `work` completes or when this future is dropped.
    pub async fn wrap_async<F: Future>(
        &self,
        name: impl Into<Cow<'static, str>>,
        granularity: Granularity,
        attributes: impl IntoIterator<Item = KeyValue>,
        work: F,
    ) -> F::Output {
        match self.start_internal(name, granularity, attributes) {
            None => work.await,
            Some(span) => work.with_context(span.context().clone()).await,
        }
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
        match self.start_internal(name, granularity, attributes) {
            None => work.await,
            Some(span) => {
                let result = work.with_context(span.context().clone()).await;
                if let Err(err) = &result {
                    span.mark_error(err);
                }
                result
            }
        }
    }

    /// Merge attributes into the currently active span.
    pub fn add_attributes_to_current_span(&self, attributes: impl IntoIterator<Item = KeyValue>) {
        if !self.is_enabled() {
            return;
        }
        Context::current().span().set_attributes(attributes);
    }

    /// Trace id of the active span as 32 lowercase hex digits.
    pub fn current_trace_id(&self) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let cx = Context::current();
        let span_context = cx.span().span_context().clone();
        if !span_context.is_valid() {
            return None;
        }
        Some(span_context.trace_id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
    use opentelemetry_sdk::trace::TracerProvider;
    use std::time::Duration;

    fn emitter(granularity: Granularity) -> (SpanEmitter, InMemorySpanExporter, TracerProvider) {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("test");
        (SpanEmitter::new(Some(tracer), granularity), exporter, provider)
    }

    fn finished(exporter: &InMemorySpanExporter) -> Vec<String> {
        exporter
            .get_finished_spans()
            .unwrap()
            .into_iter()
            .map(|s| s.name.to_string())
            .collect()
    }

    #[test]
    fn test_gate_matches_rank_rule_for_all_pairs() {
        for configured in Granularity::all_levels() {
            for call in Granularity::all_levels() {
                let (emitter, exporter, _provider) = emitter(*configured);
                let value = emitter.wrap("call", *call, [], || 7);
                assert_eq!(value, 7);

                let expected = call.rank() >= configured.rank();
                assert_eq!(emitter.should_trace(*call), expected);
                assert_eq!(
                    finished(&exporter).len(),
                    usize::from(expected),
                    "call={} configured={}",
                    call,
                    configured
                );
            }
        }
    }

    #[test]
    fn test_no_tracer_never_spans() {
        let emitter = SpanEmitter::new(None, Granularity::All);
        assert!(!emitter.should_trace(Granularity::All));
        assert_eq!(emitter.wrap("call", Granularity::All, [], || "ok"), "ok");
        assert!(emitter.current_trace_id().is_none());
    }

    #[test]
    fn test_error_passes_through_and_marks_span() {
        let (emitter, exporter, _provider) = emitter(Granularity::All);
        let result: Result<(), String> =
            emitter.try_wrap("failing", Granularity::Db, [], || Err("boom".to_string()));
        assert_eq!(result, Err("boom".to_string()));

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, Status::error("boom"));
    }

    #[test]
    fn test_panic_still_ends_span() {
        let (emitter, exporter, _provider) = emitter(Granularity::All);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            emitter.wrap("panicking", Granularity::Api, [], || panic!("work failed"))
        }));
        assert!(outcome.is_err());
        assert_eq!(finished(&exporter), vec!["panicking".to_string()]);
    }

    #[test]
    fn test_nested_spans_have_parent() {
        let (emitter, exporter, _provider) = emitter(Granularity::All);
        emitter.wrap("outer", Granularity::Api, [], || {
            emitter.wrap("inner", Granularity::Db, [], || ())
        });

        let spans = exporter.get_finished_spans().unwrap();
        let outer = spans.iter().find(|s| s.name == "outer").unwrap();
        let inner = spans.iter().find(|s| s.name == "inner").unwrap();
        assert_eq!(inner.parent_span_id, outer.span_context.span_id());
        assert_eq!(inner.span_context.trace_id(), outer.span_context.trace_id());
    }

    #[test]
    fn test_granularity_and_custom_attributes_recorded() {
        let (emitter, exporter, _provider) = emitter(Granularity::All);
        emitter.wrap(
            "attrs",
            Granularity::Service,
            [KeyValue::new("item.id", "abc")],
            || emitter.add_attributes_to_current_span([KeyValue::new("extra", 3_i64)]),
        );

        let spans = exporter.get_finished_spans().unwrap();
        let attrs = &spans[0].attributes;
        assert!(attrs.contains(&KeyValue::new("item.id", "abc")));
        assert!(attrs.contains(&KeyValue::new(GRANULARITY_ATTRIBUTE, "service")));
        assert!(attrs.contains(&KeyValue::new("extra", 3_i64)));
    }

    #[test]
    fn test_current_trace_id() {
        let (emitter, _exporter, _provider) = emitter(Granularity::All);
        assert!(emitter.current_trace_id().is_none());

        let id = emitter.wrap("traced", Granularity::Api, [], || emitter.current_trace_id());
        let id = id.expect("trace id while span is active");
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_current_trace_id_none_when_disabled() {
        let (emitter, _exporter, _provider) = emitter(Granularity::None);
        let id = emitter.wrap("untraced", Granularity::Api, [], || emitter.current_trace_id());
        assert!(id.is_none());
    }

    #[tokio::test]
    async fn test_async_nested_and_result() {
        let (emitter, exporter, _provider) = emitter(Granularity::All);
        let value = emitter
            .wrap_async("outer", Granularity::Api, [], async {
                emitter
                    .wrap_async("inner", Granularity::Service, [], async { 41 + 1 })
                    .await
            })
            .await;
        assert_eq!(value, 42);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 2);
        let outer = spans.iter().find(|s| s.name == "outer").unwrap();
        let inner = spans.iter().find(|s| s.name == "inner").unwrap();
        assert_eq!(inner.parent_span_id, outer.span_context.span_id());
    }

    #[tokio::test]
    async fn test_cancelled_future_ends_span() {
        let (emitter, exporter, _provider) = emitter(Granularity::All);
        let work = emitter.wrap_async("slow", Granularity::Api, [], async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(20), work).await;
        assert!(timed_out.is_err());
        assert_eq!(finished(&exporter), vec!["slow".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tasks_keep_their_own_parent() {
        const TASKS: usize = 64;
        let (emitter, exporter, _provider) = emitter(Granularity::All);

        let handles: Vec<_> = (0..TASKS)
            .map(|i| {
                let emitter = emitter.clone();
                tokio::spawn(async move {
                    emitter
                        .wrap_async(format!("outer-{i}"), Granularity::Api, [], async {
                            tokio::task::yield_now().await;
                            emitter.wrap(format!("inner-{i}"), Granularity::Db, [], || i)
                        })
                        .await
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), i);
        }

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), TASKS * 2);
        for i in 0..TASKS {
            let outer_name = format!("outer-{i}");
            let inner_name = format!("inner-{i}");
            let outer = spans.iter().find(|s| s.name == outer_name).unwrap();
            let inner = spans.iter().find(|s| s.name == inner_name).unwrap();
            assert_eq!(inner.parent_span_id, outer.span_context.span_id(), "{inner_name}");
            assert_eq!(
                inner.span_context.trace_id(),
                outer.span_context.trace_id(),
                "{inner_name}"
            );
        }
    }
}
