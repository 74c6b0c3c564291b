use crate::model::result::{AggregationResult, ResultKind, SingleValue};
use derive_more::{Deref, Display, IntoIterator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// BucketKey
///
/// Key of one bucket: numeric for histogram-like parents, text for terms-like ones.
///

#[derive(Clone, Debug, Deserialize, Display, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BucketKey {
    #[display("{_0}")]
    Number(f64),
    #[display("{_0}")]
    Text(String),
}

impl BucketKey {
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(key) => Some(*key),
            Self::Text(_) => None,
        }
    }
}

impl From<f64> for BucketKey {
    fn from(key: f64) -> Self {
        Self::Number(key)
    }
}

impl From<&str> for BucketKey {
    fn from(key: &str) -> Self {
        Self::Text(key.to_string())
    }
}

///
/// LookupError
///
/// Capability-checked lookup failure on one bucket's sub-aggregations.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, ThisError)]
pub enum LookupError {
    #[error("sub-aggregation not found")]
    Missing,

    #[error("sub-aggregation is a {0} result")]
    WrongKind(ResultKind),
}

///
/// Aggregations
///
/// Named sub-aggregation results of one bucket.
/// Names are unique; iteration order is by name and carries no meaning.
///

#[derive(Clone, Debug, Default, Deref, Deserialize, IntoIterator, PartialEq, Serialize)]
#[into_iterator(owned, ref)]
#[serde(transparent)]
pub struct Aggregations(BTreeMap<String, AggregationResult>);

impl Aggregations {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert one named result, returning the previous result under that name.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        result: impl Into<AggregationResult>,
    ) -> Option<AggregationResult> {
        self.0.insert(name.into(), result.into())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut AggregationResult> {
        self.0.get_mut(name)
    }

    /// Look up a named result that must expose a single value.
    pub fn single_value(&self, name: &str) -> Result<&SingleValue, LookupError> {
        let result = self.0.get(name).ok_or(LookupError::Missing)?;

        result
            .as_single_value()
            .ok_or(LookupError::WrongKind(result.kind()))
    }
}

impl<N: Into<String>, R: Into<AggregationResult>> FromIterator<(N, R)> for Aggregations {
    fn from_iter<I: IntoIterator<Item = (N, R)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, result)| (name.into(), result.into()))
                .collect(),
        )
    }
}

///
/// Bucket
///
/// One group produced by a multi-bucket aggregation: key, document count,
/// and the named sub-aggregation results computed inside it.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Bucket {
    key: BucketKey,
    doc_count: u64,
    #[serde(default)]
    aggregations: Aggregations,
}

impl Bucket {
    #[must_use]
    pub fn new(key: impl Into<BucketKey>, doc_count: u64) -> Self {
        Self {
            key: key.into(),
            doc_count,
            aggregations: Aggregations::new(),
        }
    }

    /// Attach one named sub-aggregation result while building a bucket.
    #[must_use]
    pub fn with_aggregation(
        mut self,
        name: impl Into<String>,
        result: impl Into<AggregationResult>,
    ) -> Self {
        self.aggregations.insert(name, result);
        self
    }

    #[must_use]
    pub const fn key(&self) -> &BucketKey {
        &self.key
    }

    #[must_use]
    pub const fn doc_count(&self) -> u64 {
        self.doc_count
    }

    #[must_use]
    pub const fn aggregations(&self) -> &Aggregations {
        &self.aggregations
    }

    pub const fn aggregations_mut(&mut self) -> &mut Aggregations {
        &mut self.aggregations
    }
}
