//! # pipeagg
//!
//! Derived per-bucket metrics for multi-bucket aggregation results.
//!
//! A bucket-script stage reads sibling metrics out of every bucket through
//! `buckets_path`, binds them to script variables, evaluates a scalar script,
//! and attaches the result to the same bucket under a new name.
//!
//! ## Crate layout
//! - `core`: the engine (bucket model, paths, gap policy, scripts, aggregator,
//!   observability).
//! - `error`: the stable public error taxonomy.
//! - `pipeline`: ordered chains of bucket-script stages.
//!
//! The `prelude` module carries the vocabulary needed to declare and run a
//! stage.

pub use pipeagg_core as core;

pub mod error;
pub mod pipeline;

pub use error::Error;
pub use pipeline::Pipeline;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        core::{
            prelude::*,
            script::{CompiledScript, Params, ScriptCatalog, ScriptSpec, script_fn},
        },
        error::{Error, ErrorKind, ErrorOrigin},
        pipeline::Pipeline,
    };
}
