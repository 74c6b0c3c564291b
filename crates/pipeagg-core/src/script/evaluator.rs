use crate::script::{env::ScriptEnv, error::EvaluationError};

///
/// ScriptOutput
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScriptOutput {
    Number(f64),

    /// The evaluator ran but produced no number for this bucket.
    NoValue,
}

impl From<f64> for ScriptOutput {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

///
/// ScalarEvaluator
///
/// One compiled expression. Invoked once per non-skipped bucket, possibly
/// from several worker threads at the same time.
///

pub trait ScalarEvaluator: Send + Sync {
    fn evaluate(&self, env: &ScriptEnv<'_>) -> Result<ScriptOutput, EvaluationError>;
}

impl<F> ScalarEvaluator for F
where
    F: Fn(&ScriptEnv<'_>) -> Result<ScriptOutput, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, env: &ScriptEnv<'_>) -> Result<ScriptOutput, EvaluationError> {
        self(env)
    }
}

/// Pin a closure to the evaluator signature so its argument lifetimes are
/// inferred as higher-ranked.
pub const fn script_fn<F>(f: F) -> F
where
    F: Fn(&ScriptEnv<'_>) -> Result<ScriptOutput, EvaluationError> + Send + Sync,
{
    f
}
