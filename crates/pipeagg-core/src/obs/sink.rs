//! Metrics sink boundary.
//!
//! Pipeline logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! Events are recorded on the thread that drives a stage, never from
//! parallel bucket workers.
use crate::{error::ErrorClass, obs::metrics};
use std::cell::RefCell;

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<*const dyn MetricsSink>> = RefCell::new(None);
}

///
/// StageSummary
///
/// Per-run bucket accounting reported when a stage completes.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StageSummary {
    pub buckets: u64,
    pub evaluated: u64,
    pub skipped: u64,
    pub no_value: u64,
    pub gaps_filled: u64,
    pub parallel: bool,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    StageStart {
        output: &'a str,
    },
    StageFinish {
        output: &'a str,
        summary: StageSummary,
    },
    StageFailed {
        output: &'a str,
        class: ErrorClass,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default sink that writes into the process-wide metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::StageStart { output } => {
                metrics::with_state_mut(|m| {
                    m.ops.stage_calls = m.ops.stage_calls.saturating_add(1);
                    let entry = m.outputs.entry(output.to_string()).or_default();
                    entry.stage_calls = entry.stage_calls.saturating_add(1);
                });
            }

            MetricsEvent::StageFinish { output, summary } => {
                metrics::with_state_mut(|m| {
                    if summary.parallel {
                        m.ops.parallel_runs = m.ops.parallel_runs.saturating_add(1);
                    }
                    m.ops.buckets_seen = m.ops.buckets_seen.saturating_add(summary.buckets);
                    m.ops.buckets_evaluated =
                        m.ops.buckets_evaluated.saturating_add(summary.evaluated);
                    m.ops.buckets_skipped = m.ops.buckets_skipped.saturating_add(summary.skipped);
                    m.ops.buckets_no_value =
                        m.ops.buckets_no_value.saturating_add(summary.no_value);
                    m.ops.gaps_filled = m.ops.gaps_filled.saturating_add(summary.gaps_filled);

                    let entry = m.outputs.entry(output.to_string()).or_default();
                    entry.buckets_seen = entry.buckets_seen.saturating_add(summary.buckets);
                    entry.buckets_evaluated =
                        entry.buckets_evaluated.saturating_add(summary.evaluated);
                    entry.buckets_skipped = entry.buckets_skipped.saturating_add(summary.skipped);
                    entry.buckets_no_value =
                        entry.buckets_no_value.saturating_add(summary.no_value);
                    entry.gaps_filled = entry.gaps_filled.saturating_add(summary.gaps_filled);
                });
            }

            MetricsEvent::StageFailed { output, class } => {
                metrics::with_state_mut(|m| {
                    match class {
                        ErrorClass::Configuration => {
                            m.ops.config_failures = m.ops.config_failures.saturating_add(1);
                        }
                        ErrorClass::Evaluation => {
                            m.ops.evaluation_failures =
                                m.ops.evaluation_failures.saturating_add(1);
                        }
                        ErrorClass::Cancelled => {
                            m.ops.cancellations = m.ops.cancellations.saturating_add(1);
                        }
                        ErrorClass::InvariantViolation => {
                            m.ops.invariant_failures = m.ops.invariant_failures.saturating_add(1);
                        }
                    }

                    let entry = m.outputs.entry(output.to_string()).or_default();
                    entry.failures = entry.failures.saturating_add(1);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let override_ptr = SINK_OVERRIDE.with(|cell| *cell.borrow());
    if let Some(ptr) = override_ptr {
        // SAFETY:
        // Preconditions:
        // - `ptr` was produced from a valid `&dyn MetricsSink` in `with_metrics_sink`.
        // - `with_metrics_sink` always restores the previous pointer before returning,
        //   including unwind paths via `Guard::drop`.
        // - `record` is synchronous and never stores `ptr` beyond this call.
        //
        // Aliasing:
        // - Only a shared reference is materialized, matching the shared borrow
        //   used to install the override.
        unsafe { (&*ptr).record(event) };
    } else {
        GLOBAL_METRICS_SINK.record(event);
    }
}

/// Snapshot the current metrics state for endpoint/test plumbing.
///
/// `window_start_ms` filters by window start (`EventState::since_ms`),
/// not by per-event timestamps.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> metrics::EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override on this thread.
pub fn with_metrics_sink<T>(sink: &dyn MetricsSink, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<*const dyn MetricsSink>);

    impl Drop for Guard {
        fn drop(&mut self) {
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = self.0;
            });
        }
    }

    // SAFETY:
    // Preconditions:
    // - `sink_ptr` is installed only for this dynamic scope.
    // - `Guard` always restores the previous slot on all exits, including panic.
    // - `record` only dereferences synchronously and never persists `sink_ptr`.
    //
    // What would break this:
    // - Any async/deferred use of `sink_ptr` beyond this scope.
    // - Any path that bypasses Guard restoration.
    let sink_ptr = unsafe { std::mem::transmute::<&dyn MetricsSink, *const dyn MetricsSink>(sink) };
    let prev = SINK_OVERRIDE.with(|cell| {
        let mut slot = cell.borrow_mut();
        slot.replace(sink_ptr)
    });
    let _guard = Guard(prev);

    f()
}

/// StageSpan
/// RAII guard that emits start/finish events for one stage run.
/// A span dropped without `finish` or `fail` is recorded as an invariant failure.

pub(crate) struct StageSpan<'a> {
    output: &'a str,
    finished: bool,
}

impl<'a> StageSpan<'a> {
    #[must_use]
    pub(crate) fn new(output: &'a str) -> Self {
        record(MetricsEvent::StageStart { output });

        Self {
            output,
            finished: false,
        }
    }

    pub(crate) fn finish(mut self, summary: StageSummary) {
        record(MetricsEvent::StageFinish {
            output: self.output,
            summary,
        });
        self.finished = true;
    }

    pub(crate) fn fail(mut self, class: ErrorClass) {
        record(MetricsEvent::StageFailed {
            output: self.output,
            class,
        });
        self.finished = true;
    }
}

impl Drop for StageSpan<'_> {
    fn drop(&mut self) {
        if !self.finished {
            record(MetricsEvent::StageFailed {
                output: self.output,
                class: ErrorClass::InvariantViolation,
            });
            self.finished = true;
        }
    }
}
