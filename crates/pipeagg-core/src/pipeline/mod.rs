//! Module: pipeline
//! Responsibility: the bucket-script pipeline stage and its execution policy.
//! Does not own: base metric computation or cross-bucket windowing.
//! Boundary: consumes a materialized parent collection and returns it with
//! the same buckets, in the same order, each optionally carrying one new metric.

mod aggregator;
mod cancel;
mod config;

#[cfg(test)]
mod tests;

pub use aggregator::{BucketScriptAggregator, EvaluationOutcome};
pub use cancel::CancelToken;
pub use config::{BucketScriptConfig, ExecutionConfig};
