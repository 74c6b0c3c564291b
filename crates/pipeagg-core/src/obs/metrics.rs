use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    sync::{LazyLock, Mutex, MutexGuard, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, in-memory counters for pipeline stage runs.
/// One instance per process, shared by every thread that drives a stage.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub outputs: BTreeMap<String, OutputCounters>,
    pub since_ms: u64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            outputs: BTreeMap::new(),
            since_ms: now_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Stage entrypoints
    pub stage_calls: u64,
    pub parallel_runs: u64,

    // Failures by class
    pub config_failures: u64,
    pub evaluation_failures: u64,
    pub cancellations: u64,
    pub invariant_failures: u64,

    // Buckets
    pub buckets_seen: u64,
    pub buckets_evaluated: u64,
    pub buckets_skipped: u64,
    pub buckets_no_value: u64,
    pub gaps_filled: u64,
}

///
/// OutputCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OutputCounters {
    pub stage_calls: u64,
    pub failures: u64,
    pub buckets_seen: u64,
    pub buckets_evaluated: u64,
    pub buckets_skipped: u64,
    pub buckets_no_value: u64,
    pub gaps_filled: u64,
}

static EVENT_STATE: LazyLock<Mutex<EventState>> =
    LazyLock::new(|| Mutex::new(EventState::default()));

// Counters stay usable after a panicking recorder; a torn update only
// skews telemetry.
fn lock_state() -> MutexGuard<'static, EventState> {
    EVENT_STATE.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    f(&lock_state())
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    f(&mut lock_state())
}

/// Reset all counters (useful in tests).
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

/// Serialize tests that reset or read exact global counters.
#[cfg(test)]
pub(crate) fn test_guard() -> MutexGuard<'static, ()> {
    static GUARD: Mutex<()> = Mutex::new(());

    GUARD.lock().unwrap_or_else(PoisonError::into_inner)
}

///
/// EventReport
/// Counter report for endpoints and tests.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    /// Ephemeral runtime counters since `since_ms`.
    pub counters: Option<EventState>,
    /// Per-output counters and ratios.
    pub output_counters: Vec<OutputSummary>,
}

///
/// OutputSummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OutputSummary {
    pub name: String,
    pub stage_calls: u64,
    pub failures: u64,
    pub buckets_seen: u64,
    pub buckets_evaluated: u64,
    pub buckets_skipped: u64,
    pub buckets_no_value: u64,
    pub gaps_filled: u64,
    pub avg_buckets_per_call: f64,
    pub skip_ratio: f64,
}

/// Build a metrics report from in-memory counters.
///
/// `window_start_ms` drops the counters when the current window started
/// before the requested instant.
#[must_use]
pub(crate) fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    let snap = with_state(Clone::clone);
    if window_start_ms.is_some_and(|start| snap.since_ms < start) {
        return EventReport::default();
    }

    build_report(snap)
}

#[expect(clippy::cast_precision_loss)]
fn build_report(snap: EventState) -> EventReport {
    let mut output_counters: Vec<OutputSummary> = Vec::new();
    for (name, ops) in &snap.outputs {
        let avg_buckets = if ops.stage_calls > 0 {
            ops.buckets_seen as f64 / ops.stage_calls as f64
        } else {
            0.0
        };
        let skip_ratio = if ops.buckets_seen > 0 {
            ops.buckets_skipped as f64 / ops.buckets_seen as f64
        } else {
            0.0
        };

        output_counters.push(OutputSummary {
            name: name.clone(),
            stage_calls: ops.stage_calls,
            failures: ops.failures,
            buckets_seen: ops.buckets_seen,
            buckets_evaluated: ops.buckets_evaluated,
            buckets_skipped: ops.buckets_skipped,
            buckets_no_value: ops.buckets_no_value,
            gaps_filled: ops.gaps_filled,
            avg_buckets_per_call: avg_buckets,
            skip_ratio,
        });
    }

    output_counters.sort_by(|a, b| {
        match b
            .skip_ratio
            .partial_cmp(&a.skip_ratio)
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Equal => a.name.cmp(&b.name),
            other => other,
        }
    });

    EventReport {
        counters: Some(snap),
        output_counters,
    }
}

///
/// TESTS
///
