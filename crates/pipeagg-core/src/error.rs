use crate::{model::ResultKind, path::PathSyntaxError, script::EvaluationError};
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; intended for internal use and may change without notice.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `class`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without a structured detail payload.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a configuration error carrying its typed detail.
    pub fn config(err: ConfigError) -> Self {
        Self {
            class: ErrorClass::Configuration,
            origin: err.origin(),
            message: err.to_string(),
            detail: Some(ErrorDetail::Config(err)),
        }
    }

    /// Construct a script-origin evaluation error for one bucket.
    pub fn evaluation(bucket: impl fmt::Display, err: EvaluationError) -> Self {
        Self {
            class: ErrorClass::Evaluation,
            origin: ErrorOrigin::Script,
            message: format!("bucket script failed for bucket '{bucket}': {err}"),
            detail: Some(ErrorDetail::Evaluation(err)),
        }
    }

    /// Construct an aggregator-origin cancellation error.
    pub(crate) fn cancelled(output: &str) -> Self {
        Self::new(
            ErrorClass::Cancelled,
            ErrorOrigin::Aggregator,
            format!("bucket script '{output}' cancelled before completion"),
        )
    }

    /// Construct an aggregator-origin invariant violation.
    pub(crate) fn aggregator_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Aggregator,
            message.into(),
        )
    }

    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self.class, ErrorClass::Configuration)
    }

    #[must_use]
    pub const fn is_evaluation(&self) -> bool {
        matches!(self.class, ErrorClass::Evaluation)
    }

    /// Borrow the typed configuration detail, if this is a configuration error.
    #[must_use]
    pub const fn config_detail(&self) -> Option<&ConfigError> {
        match &self.detail {
            Some(ErrorDetail::Config(err)) => Some(err),
            _ => None,
        }
    }

    /// Borrow the typed evaluation detail, if this is an evaluation error.
    #[must_use]
    pub const fn evaluation_detail(&self) -> Option<&EvaluationError> {
        match &self.detail {
            Some(ErrorDetail::Evaluation(err)) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::config(err)
    }
}

///
/// ErrorDetail
///
/// Structured, class-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Config(ConfigError),
    #[error("{0}")]
    Evaluation(EvaluationError),
}

///
/// ConfigError
///
/// The pipeline declaration does not fit the bucket structure it runs over.
/// Always fatal to the whole stage; never recovered by gap policy.
///

#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum ConfigError {
    #[error("buckets_path must name at least one sibling aggregation")]
    EmptyBucketsPath,

    #[error("buckets_path variable name must not be empty")]
    EmptyVariableName,

    #[error("buckets_path binds variable '{name}' more than once")]
    DuplicateVariable { name: String },

    #[error("bucket script output name must not be empty")]
    EmptyOutputName,

    #[error("invalid bucket path '{path}': {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: PathSyntaxError,
    },

    #[error("script not found: {script}")]
    UnknownScript { script: String },

    #[error("script declares both inline source '{inline}' and stored id '{id}'")]
    AmbiguousScript { inline: String, id: String },

    #[error("script must declare an inline 'source' or a stored 'id'")]
    MissingScript,

    #[error("bucket path '{path}' does not name a sibling aggregation of bucket '{bucket}'")]
    UnknownPath { path: String, bucket: String },

    #[error("bucket path '{path}' resolves to a {kind} result in bucket '{bucket}', expected a single value")]
    NotSingleValue {
        path: String,
        bucket: String,
        kind: ResultKind,
    },

    #[error("bucket path '_key' requires a numeric key, bucket '{bucket}' has a text key")]
    NonNumericKey { bucket: String },

    #[error("output name '{name}' already exists in bucket '{bucket}'")]
    OutputNameCollision { name: String, bucket: String },

    #[error("parent aggregation '{name}' not found")]
    ParentNotFound { name: String },

    #[error("parent aggregation '{name}' is a {kind} result, expected multi-bucket")]
    ParentNotMultiBucket { name: String, kind: ResultKind },
}

impl ConfigError {
    /// Return the module boundary this configuration failure belongs to.
    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::EmptyBucketsPath
            | Self::EmptyVariableName
            | Self::DuplicateVariable { .. }
            | Self::InvalidPath { .. } => ErrorOrigin::Path,
            Self::UnknownScript { .. } | Self::AmbiguousScript { .. } | Self::MissingScript => {
                ErrorOrigin::Script
            }
            Self::UnknownPath { .. } | Self::NotSingleValue { .. } | Self::NonNumericKey { .. } => {
                ErrorOrigin::Resolver
            }
            Self::EmptyOutputName
            | Self::OutputNameCollision { .. }
            | Self::ParentNotFound { .. }
            | Self::ParentNotMultiBucket { .. } => ErrorOrigin::Aggregator,
        }
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Configuration,
    Evaluation,
    Cancelled,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Configuration => "configuration",
            Self::Evaluation => "evaluation",
            Self::Cancelled => "cancelled",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Path,
    Resolver,
    Script,
    Aggregator,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Path => "path",
            Self::Resolver => "resolver",
            Self::Script => "script",
            Self::Aggregator => "aggregator",
        };
        write!(f, "{label}")
    }
}
