//! Core runtime for pipeagg: the bucket model, bucket paths, gap policy,
//! the scalar evaluator contract, and the bucket-script pipeline aggregator.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod error;
pub mod gap;
pub mod model;
pub mod obs;
pub mod path;
pub mod pipeline;
pub mod resolve;
pub mod script;


///
/// CONSTANTS
///

/// Prefix of the variable names bound by positional bucket paths.
///
/// The Nth positional path binds to `_value{N}`.
pub const POSITIONAL_VARIABLE_PREFIX: &str = "_value";

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, catalogs, or sinks are re-exported here.
///

pub mod prelude {
    pub use crate::{
        gap::GapPolicy,
        model::{AggregationResult, Aggregations, Bucket, BucketKey, MultiBucket, SingleValue},
        path::{BucketsPath, PathExpression},
        pipeline::{BucketScriptAggregator, BucketScriptConfig, ExecutionConfig},
        script::{ScalarEvaluator, ScriptEnv, ScriptOutput},
    };
}
