use crate::script::error::EvaluationError;
use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// ParamValue
///
/// Static script parameter value taken verbatim from the request.
///

#[derive(Clone, Debug, Deserialize, From, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }

    /// Return the numeric value of an int or float parameter.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

///
/// Params
///
/// Static parameters of one script, identical for every bucket.
///

#[derive(Clone, Debug, Default, Deref, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add one parameter while building a parameter set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Read a numeric parameter, failing when it is missing or not a number.
    pub fn number(&self, name: &str) -> Result<f64, EvaluationError> {
        let value = self
            .0
            .get(name)
            .ok_or_else(|| EvaluationError::UndefinedVariable {
                name: name.to_string(),
            })?;

        value
            .as_f64()
            .ok_or_else(|| EvaluationError::ParamTypeMismatch {
                name: name.to_string(),
                found: value.type_name(),
            })
    }
}

impl<N: Into<String>, V: Into<ParamValue>> FromIterator<(N, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}
