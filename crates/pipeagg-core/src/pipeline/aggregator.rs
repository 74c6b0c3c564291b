//! Module: pipeline::aggregator
//! Responsibility: drive resolve -> evaluate -> attach over one bucket collection.
//! Does not own: path lookup rules (resolve) or gap substitution (gap).
//! Boundary: either every bucket is visited and augmented in place, or the
//! collection is left untouched and an error is returned.

use crate::{
    error::{ConfigError, InternalError},
    gap::GapPolicy,
    model::{Aggregations, Bucket, MultiBucket, SingleValue},
    obs::sink::{StageSpan, StageSummary},
    path::{BucketsPath, VariableBinding},
    pipeline::{
        cancel::CancelToken,
        config::{BucketScriptConfig, ExecutionConfig},
    },
    resolve::{BucketPathResolver, Resolution},
    script::{CompiledScript, ScriptCatalog, ScriptOutput},
};
use derive_more::Display;
use rayon::prelude::*;

///
/// EvaluationOutcome
///
/// Per-bucket verdict, produced once and never retried.
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EvaluationOutcome {
    Value(f64),

    /// The evaluator ran and reported no number; an empty value is attached.
    NoValue,

    /// A data gap under `GapPolicy::Skip`; nothing is attached.
    Skipped,
}

///
/// Stage
///
/// Per-bucket progression, surfaced through debug tracing.
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
enum Stage {
    #[display("resolving")]
    Resolving,
    #[display("evaluating")]
    Evaluating,
    #[display("skipped")]
    Skipped,
    #[display("attaching")]
    Attaching,
    #[display("done")]
    Done,
}

///
/// BucketOutcome
///

#[derive(Clone, Copy, Debug)]
struct BucketOutcome {
    outcome: EvaluationOutcome,
    gaps_filled: u32,
}

///
/// BucketScriptAggregator
///
/// Derives one new single-value metric per bucket from sibling metrics of
/// that bucket. Immutable after construction; one instance may reduce many
/// collections.
///

#[derive(Debug)]
pub struct BucketScriptAggregator {
    name: String,
    buckets_path: BucketsPath,
    bindings: Vec<VariableBinding>,
    script: CompiledScript,
    gap_policy: GapPolicy,
    execution: ExecutionConfig,
    cancel: Option<CancelToken>,
    debug: bool,
}

impl BucketScriptAggregator {
    /// Build an aggregator around an already compiled script.
    pub fn new(
        name: impl Into<String>,
        buckets_path: BucketsPath,
        script: CompiledScript,
        gap_policy: GapPolicy,
    ) -> Result<Self, InternalError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::EmptyOutputName.into());
        }
        if buckets_path.is_empty() {
            return Err(ConfigError::EmptyBucketsPath.into());
        }
        let bindings = buckets_path.bindings();

        Ok(Self {
            name,
            buckets_path,
            bindings,
            script,
            gap_policy,
            execution: ExecutionConfig::default(),
            cancel: None,
            debug: false,
        })
    }

    /// Build an aggregator from a declarative config, compiling its script
    /// through the catalog.
    pub fn from_config(
        config: &BucketScriptConfig,
        catalog: &ScriptCatalog,
    ) -> Result<Self, InternalError> {
        let script = catalog.compile(config.script())?;

        Self::new(
            config.name(),
            config.buckets_path().clone(),
            script,
            config.gap_policy(),
        )
    }

    #[must_use]
    pub const fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Enable verbose stage tracing on stdout.
    #[must_use]
    pub const fn debug(mut self) -> Self {
        self.debug = true;
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
    pub const fn gap_policy(&self) -> GapPolicy {
        self.gap_policy
    }

    #[must_use]
    pub const fn execution(&self) -> ExecutionConfig {
        self.execution
    }

    #[must_use]
    pub const fn script(&self) -> &CompiledScript {
        &self.script
    }

    /// Reduce one parent collection and return it with the new metric attached.
    pub fn reduce(&self, mut parent: MultiBucket) -> Result<MultiBucket, InternalError> {
        self.reduce_in_place(&mut parent)?;

        Ok(parent)
    }

    /// Reduce the named top-level multi-bucket result inside `aggregations`.
    pub fn reduce_named(
        &self,
        aggregations: &mut Aggregations,
        parent: &str,
    ) -> Result<(), InternalError> {
        let result = aggregations
            .get_mut(parent)
            .ok_or_else(|| ConfigError::ParentNotFound {
                name: parent.to_string(),
            })?;
        let kind = result.kind();
        let buckets = result
            .as_multi_bucket_mut()
            .ok_or_else(|| ConfigError::ParentNotMultiBucket {
                name: parent.to_string(),
                kind,
            })?;

        self.reduce_in_place(buckets)
    }

    /// Reduce one parent collection in place.
    ///
    /// On error the collection is left exactly as it was.
    pub fn reduce_in_place(&self, parent: &mut MultiBucket) -> Result<(), InternalError> {
        let span = StageSpan::new(&self.name);

        match self.run(parent) {
            Ok(summary) => {
                span.finish(summary);
                Ok(())
            }
            Err(err) => {
                self.trace(|| format!("failed: {}", err.display_with_class()));
                span.fail(err.class);
                Err(err)
            }
        }
    }

    fn run(&self, parent: &mut MultiBucket) -> Result<StageSummary, InternalError> {
        let resolver = BucketPathResolver::new(&self.bindings, self.gap_policy);
        self.check_structure(&resolver, parent.buckets())?;

        let parallel = self.execution.runs_parallel(parent.len());
        self.trace(|| {
            format!(
                "{} buckets, gap_policy={}, parallel={parallel}",
                parent.len(),
                self.gap_policy
            )
        });

        let outcomes = if parallel {
            parent
                .buckets()
                .par_iter()
                .map(|bucket| self.evaluate_bucket(&resolver, bucket))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            parent
                .buckets()
                .iter()
                .map(|bucket| self.evaluate_bucket(&resolver, bucket))
                .collect::<Result<Vec<_>, _>>()?
        };

        if outcomes.len() != parent.len() {
            return Err(InternalError::aggregator_invariant(format!(
                "bucket script '{}' produced {} outcomes for {} buckets",
                self.name,
                outcomes.len(),
                parent.len()
            )));
        }

        let mut summary = StageSummary {
            buckets: u64::try_from(outcomes.len()).unwrap_or(u64::MAX),
            parallel,
            ..StageSummary::default()
        };
        for (bucket, outcome) in parent.buckets_mut().iter_mut().zip(outcomes) {
            summary.gaps_filled = summary
                .gaps_filled
                .saturating_add(u64::from(outcome.gaps_filled));
            match outcome.outcome {
                EvaluationOutcome::Value(value) => {
                    summary.evaluated += 1;
                    self.attach(bucket, SingleValue::new(value));
                }
                EvaluationOutcome::NoValue => {
                    summary.evaluated += 1;
                    summary.no_value += 1;
                    self.attach(bucket, SingleValue::empty());
                }
                EvaluationOutcome::Skipped => summary.skipped += 1,
            }
        }
        self.trace(|| {
            format!(
                "{}: evaluated={} skipped={} gaps_filled={}",
                Stage::Done,
                summary.evaluated,
                summary.skipped,
                summary.gaps_filled
            )
        });

        Ok(summary)
    }

    // Configuration errors must not depend on bucket order, values, or gap
    // policy, so the whole structure is checked before any evaluation.
    fn check_structure(
        &self,
        resolver: &BucketPathResolver<'_>,
        buckets: &[Bucket],
    ) -> Result<(), ConfigError> {
        for bucket in buckets {
            resolver.check_structure(bucket)?;
            if bucket.aggregations().contains_key(&self.name) {
                return Err(ConfigError::OutputNameCollision {
                    name: self.name.clone(),
                    bucket: bucket.key().to_string(),
                });
            }
        }

        Ok(())
    }

    fn evaluate_bucket(
        &self,
        resolver: &BucketPathResolver<'_>,
        bucket: &Bucket,
    ) -> Result<BucketOutcome, InternalError> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(InternalError::cancelled(&self.name));
        }

        self.trace_bucket(Stage::Resolving, bucket);
        let inputs = match resolver.resolve(bucket)? {
            Resolution::Resolved(inputs) => inputs,
            Resolution::Skip => {
                self.trace_bucket(Stage::Skipped, bucket);
                return Ok(BucketOutcome {
                    outcome: EvaluationOutcome::Skipped,
                    gaps_filled: 0,
                });
            }
        };

        self.trace_bucket(Stage::Evaluating, bucket);
        let output = self
            .script
            .evaluate(inputs.variables())
            .map_err(|err| InternalError::evaluation(bucket.key(), err))?;
        let outcome = match output {
            ScriptOutput::Number(value) => EvaluationOutcome::Value(value),
            ScriptOutput::NoValue => EvaluationOutcome::NoValue,
        };

        Ok(BucketOutcome {
            outcome,
            gaps_filled: inputs.gaps_filled(),
        })
    }

    fn attach(&self, bucket: &mut Bucket, value: SingleValue) {
        self.trace_bucket(Stage::Attaching, bucket);
        bucket.aggregations_mut().insert(self.name.as_str(), value);
    }

    fn trace_bucket(&self, stage: Stage, bucket: &Bucket) {
        self.trace(|| format!("{stage} bucket {}", bucket.key()));
    }

    /// Print one debug line; `message` runs only when tracing is enabled.
    pub(super) fn trace(&self, message: impl FnOnce() -> String) {
        if self.debug {
            println!("[debug] bucket_script '{}': {}", self.name, message());
        }
    }
}
