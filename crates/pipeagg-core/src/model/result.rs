use crate::model::bucket::Bucket;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

///
/// ResultKind
///
/// Capability tag of one aggregation result.
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ResultKind {
    #[display("single-value")]
    SingleValue,
    #[display("multi-bucket")]
    MultiBucket,
}

///
/// AggregationResult
///
/// Tagged result of one named aggregation inside a bucket.
/// Consumers reach the payload through the capability-checked accessors
/// instead of assuming a shape.
///

#[derive(Clone, Debug, Deserialize, From, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationResult {
    SingleValue(SingleValue),
    MultiBucket(MultiBucket),
}

impl AggregationResult {
    #[must_use]
    pub const fn kind(&self) -> ResultKind {
        match self {
            Self::SingleValue(_) => ResultKind::SingleValue,
            Self::MultiBucket(_) => ResultKind::MultiBucket,
        }
    }

    #[must_use]
    pub const fn as_single_value(&self) -> Option<&SingleValue> {
        match self {
            Self::SingleValue(value) => Some(value),
            Self::MultiBucket(_) => None,
        }
    }

    #[must_use]
    pub const fn as_multi_bucket(&self) -> Option<&MultiBucket> {
        match self {
            Self::MultiBucket(buckets) => Some(buckets),
            Self::SingleValue(_) => None,
        }
    }

    pub const fn as_multi_bucket_mut(&mut self) -> Option<&mut MultiBucket> {
        match self {
            Self::MultiBucket(buckets) => Some(buckets),
            Self::SingleValue(_) => None,
        }
    }
}

///
/// SingleValue
///
/// One numeric metric. `None` means the metric has no value for its bucket
/// (for example a sum over zero matching documents left unset).
///

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SingleValue {
    value: Option<f64>,
}

impl SingleValue {
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Self { value: Some(value) }
    }

    /// Build a single value that explicitly carries no number.
    #[must_use]
    pub const fn empty() -> Self {
        Self { value: None }
    }

    /// Return the raw value, which may be absent or non-finite.
    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        self.value
    }

    /// Return the value only when it is a finite number.
    #[must_use]
    pub fn finite_value(&self) -> Option<f64> {
        self.value.filter(|value| value.is_finite())
    }
}

impl From<f64> for SingleValue {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

///
/// MultiBucket
///
/// Ordered bucket sequence produced by a multi-bucket aggregation.
/// The order is part of the result and survives every pipeline stage.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MultiBucket {
    buckets: Vec<Bucket>,
}

impl MultiBucket {
    #[must_use]
    pub const fn new(buckets: Vec<Bucket>) -> Self {
        Self { buckets }
    }

    #[must_use]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Borrow the buckets mutably. A slice keeps the sequence length fixed.
    pub fn buckets_mut(&mut self) -> &mut [Bucket] {
        &mut self.buckets
    }

    #[must_use]
    pub fn into_buckets(self) -> Vec<Bucket> {
        self.buckets
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl FromIterator<Bucket> for MultiBucket {
    fn from_iter<I: IntoIterator<Item = Bucket>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
