use crate::{gap::GapPolicy, path::BucketsPath, script::ScriptSpec};
use serde::Deserialize;

///
/// BucketScriptConfig
///
/// Declarative bucket-script stage as accepted from the request layer.
///

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BucketScriptConfig {
    name: String,
    buckets_path: BucketsPath,
    script: ScriptSpec,
    #[serde(default)]
    gap_policy: GapPolicy,
}

impl BucketScriptConfig {
    pub fn new(name: impl Into<String>, buckets_path: BucketsPath, script: ScriptSpec) -> Self {
        Self {
            name: name.into(),
            buckets_path,
            script,
            gap_policy: GapPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_gap_policy(mut self, gap_policy: GapPolicy) -> Self {
        self.gap_policy = gap_policy;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn buckets_path(&self) -> &BucketsPath {
        &self.buckets_path
    }

    #[must_use]
    pub const fn script(&self) -> &ScriptSpec {
        &self.script
    }

    #[must_use]
    pub const fn gap_policy(&self) -> GapPolicy {
        self.gap_policy
    }
}

///
/// ExecutionConfig
///
/// Execution policy for one stage run. Collections with at least
/// `parallel_threshold` buckets are evaluated on the rayon pool.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExecutionConfig {
    parallel_threshold: usize,
}

impl ExecutionConfig {
    pub const DEFAULT_PARALLEL_THRESHOLD: usize = 512;

    #[must_use]
    pub const fn new() -> Self {
        Self {
            parallel_threshold: Self::DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    /// Never leave the calling thread.
    #[must_use]
    pub const fn sequential() -> Self {
        Self {
            parallel_threshold: usize::MAX,
        }
    }

    #[must_use]
    pub const fn with_parallel_threshold(mut self, parallel_threshold: usize) -> Self {
        self.parallel_threshold = parallel_threshold;
        self
    }

    #[must_use]
    pub const fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    /// Return true when a collection of `buckets` should run in parallel.
    #[must_use]
    pub const fn runs_parallel(&self, buckets: usize) -> bool {
        buckets > 1 && buckets >= self.parallel_threshold
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::new()
    }
}
