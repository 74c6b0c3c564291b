//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! This module never inspects buckets; stages report summaries through
//! `sink::record`.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, EventState, OutputCounters, OutputSummary};
pub use sink::{
    MetricsEvent, MetricsSink, StageSummary, metrics_report, metrics_reset_all, with_metrics_sink,
};
