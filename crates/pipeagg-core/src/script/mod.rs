//! Module: script
//! Responsibility: the scalar evaluator contract and its variable environment.
//! Does not own: any expression grammar or compiler; evaluators are supplied
//! by the embedding engine and registered in a `ScriptCatalog`.
//! Boundary: evaluators are reentrant, deterministic, and side-effect free.

mod catalog;
mod env;
mod error;
mod evaluator;
mod params;


pub use catalog::{CompiledScript, ScriptCatalog, ScriptSource, ScriptSpec};
pub use env::{ScriptEnv, Variables};
pub use error::EvaluationError;
pub use evaluator::{ScalarEvaluator, ScriptOutput, script_fn};
pub use params::{ParamValue, Params};
