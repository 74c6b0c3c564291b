//! Module: pipeline
//! Responsibility: ordered chains of bucket-script stages over one parent.
//! Does not own: per-bucket resolution or evaluation (pipeagg-core).
//! Boundary: a chain either applies every stage or leaves the caller's
//! collection untouched.


use crate::error::{Error, ErrorKind, ErrorOrigin};
use pipeagg_core::{
    error::{ConfigError, InternalError},
    model::{Aggregations, MultiBucket},
    pipeline::{BucketScriptAggregator, BucketScriptConfig, CancelToken, ExecutionConfig},
    script::ScriptCatalog,
};

///
/// Pipeline
///
/// Ordered bucket-script stages applied to the same parent collection.
/// Each stage sees the outputs of the stages before it.
///

#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<BucketScriptAggregator>,
}

impl Pipeline {
    #[must_use]
    pub const fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Build a chain from declarative stage configs, compiling every script
    /// through `catalog` before anything runs.
    pub fn from_configs<'a>(
        configs: impl IntoIterator<Item = &'a BucketScriptConfig>,
        catalog: &ScriptCatalog,
    ) -> Result<Self, Error> {
        configs
            .into_iter()
            .try_fold(Self::new(), |pipeline, config| {
                let stage = BucketScriptAggregator::from_config(config, catalog)?;
                pipeline.with_stage(stage)
            })
    }

    /// Append one stage. Output names must be unique across the chain.
    pub fn with_stage(mut self, stage: BucketScriptAggregator) -> Result<Self, Error> {
        if self.stages.iter().any(|s| s.name() == stage.name()) {
            return Err(Error::new(
                ErrorKind::Configuration,
                ErrorOrigin::Pipeline,
                format!("pipeline already has a stage named '{}'", stage.name()),
            ));
        }
        self.stages.push(stage);

        Ok(self)
    }

    /// Apply one execution config to every stage.
    #[must_use]
    pub fn with_execution(self, execution: ExecutionConfig) -> Self {
        self.map_stages(|stage| stage.with_execution(execution))
    }

    /// Share one cancellation token across every stage.
    #[must_use]
    pub fn with_cancel_token(self, cancel: &CancelToken) -> Self {
        self.map_stages(|stage| stage.with_cancel_token(cancel.clone()))
    }

    #[must_use]
    pub fn debug(self) -> Self {
        self.map_stages(BucketScriptAggregator::debug)
    }

    #[must_use]
    pub fn stages(&self) -> &[BucketScriptAggregator] {
        &self.stages
    }

    /// Output names in the order the stages run.
    #[must_use]
    pub fn output_names(&self) -> Vec<&str> {
        self.stages.iter().map(BucketScriptAggregator::name).collect()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage over a copy of `parent` and return the result.
    pub fn reduce(&self, parent: &MultiBucket) -> Result<MultiBucket, Error> {
        let mut working = parent.clone();
        for stage in &self.stages {
            stage.reduce_in_place(&mut working)?;
        }

        Ok(working)
    }

    /// Run every stage over `parent`, replacing it only when all succeed.
    pub fn reduce_in_place(&self, parent: &mut MultiBucket) -> Result<(), Error> {
        *parent = self.reduce(parent)?;

        Ok(())
    }

    /// Run the chain over the named top-level multi-bucket result.
    pub fn reduce_named(&self, aggregations: &mut Aggregations, parent: &str) -> Result<(), Error> {
        let result = aggregations
            .get_mut(parent)
            .ok_or_else(|| ConfigError::ParentNotFound {
                name: parent.to_string(),
            })
            .map_err(InternalError::from)?;
        let kind = result.kind();
        let buckets = result
            .as_multi_bucket_mut()
            .ok_or_else(|| ConfigError::ParentNotMultiBucket {
                name: parent.to_string(),
                kind,
            })
            .map_err(InternalError::from)?;

        self.reduce_in_place(buckets)
    }

    fn map_stages(
        self,
        f: impl FnMut(BucketScriptAggregator) -> BucketScriptAggregator,
    ) -> Self {
        Self {
            stages: self.stages.into_iter().map(f).collect(),
        }
    }
}

impl TryFrom<Vec<BucketScriptAggregator>> for Pipeline {
    type Error = Error;

    fn try_from(stages: Vec<BucketScriptAggregator>) -> Result<Self, Self::Error> {
        stages.into_iter().try_fold(Self::new(), Self::with_stage)
    }
}
