use crate::script::{error::EvaluationError, params::Params};
use derive_more::Deref;
use std::collections::BTreeMap;

///
/// Variables
///
/// Finite bucket inputs keyed by variable name.
///

#[derive(Clone, Debug, Default, Deref, PartialEq)]
pub struct Variables(BTreeMap<String, f64>);

impl Variables {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }
}

impl<N: Into<String>> FromIterator<(N, f64)> for Variables {
    fn from_iter<I: IntoIterator<Item = (N, f64)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }
}

///
/// ScriptEnv
///
/// Merged environment handed to an evaluator for one bucket.
/// Static params sit underneath; a bucket variable shadows a param of the
/// same name.
///

#[derive(Clone, Copy, Debug)]
pub struct ScriptEnv<'a> {
    variables: &'a Variables,
    params: &'a Params,
}

impl<'a> ScriptEnv<'a> {
    #[must_use]
    pub const fn new(variables: &'a Variables, params: &'a Params) -> Self {
        Self { variables, params }
    }

    #[must_use]
    pub const fn variables(&self) -> &'a Variables {
        self.variables
    }

    #[must_use]
    pub const fn params(&self) -> &'a Params {
        self.params
    }

    /// Look up a name as a number: bucket variables first, then params.
    pub fn number(&self, name: &str) -> Result<f64, EvaluationError> {
        match self.variables.get(name) {
            Some(value) => Ok(*value),
            None => self.params.number(name),
        }
    }
}
