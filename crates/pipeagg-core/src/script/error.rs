use thiserror::Error as ThisError;

///
/// EvaluationError
///
/// Failure reported by a scalar evaluator for one bucket's inputs.
/// Fatal to the whole stage; never retried and never turned into a skip.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum EvaluationError {
    #[error("variable '{name}' is not bound")]
    UndefinedVariable { name: String },

    #[error("parameter '{name}' is {found}, expected a number")]
    ParamTypeMismatch { name: String, found: &'static str },

    #[error("{message}")]
    Failed { message: String },
}

impl EvaluationError {
    /// Build an opaque evaluator failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
