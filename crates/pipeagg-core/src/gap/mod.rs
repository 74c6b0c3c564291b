//! Module: gap
//! Responsibility: substitution rule for bucket inputs that carry no usable number.
//! Does not own: path lookup or the decision to abort on malformed paths.
//! Boundary: pure per-input strategy; one call per referenced path per bucket.


use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error as ThisError;

///
/// GapPolicy
///
/// Fixed at aggregator construction. `Skip` drops the new metric for a bucket
/// with a gap; `InsertZeros` substitutes `0.0` and keeps going.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    #[default]
    #[display("skip")]
    Skip,
    #[display("insert_zeros")]
    InsertZeros,
}

///
/// GapValue
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GapValue {
    /// Usable number; `filled` marks a substituted zero.
    Finite { value: f64, filled: bool },
    Undefined,
}

impl GapPolicy {
    /// Return true when a raw input counts as a gap.
    ///
    /// Absent, NaN, and infinite values are gaps, and so is every input of a
    /// bucket that matched no documents.
    #[must_use]
    pub fn is_gap(raw: Option<f64>, doc_count: u64) -> bool {
        doc_count == 0 || !raw.is_some_and(f64::is_finite)
    }

    /// Resolve one raw bucket input under this policy.
    #[must_use]
    pub fn apply(self, raw: Option<f64>, doc_count: u64) -> GapValue {
        match raw {
            Some(value) if !Self::is_gap(raw, doc_count) => GapValue::Finite {
                value,
                filled: false,
            },
            _ => match self {
                Self::Skip => GapValue::Undefined,
                Self::InsertZeros => GapValue::Finite {
                    value: 0.0,
                    filled: true,
                },
            },
        }
    }
}

///
/// UnknownGapPolicy
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("unknown gap policy '{value}', expected 'skip' or 'insert_zeros'")]
pub struct UnknownGapPolicy {
    pub value: String,
}

impl FromStr for GapPolicy {
    type Err = UnknownGapPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "insert_zeros" => Ok(Self::InsertZeros),
            _ => Err(UnknownGapPolicy {
                value: s.to_string(),
            }),
        }
    }
}
