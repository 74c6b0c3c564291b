//! Module: resolve
//! Responsibility: turn one bucket plus declared bindings into script inputs
//! or a skip verdict.
//! Does not own: script evaluation or attaching outputs to buckets.
//! Boundary: malformed bindings surface as `ConfigError`; data gaps never do.


use crate::{
    error::ConfigError,
    gap::{GapPolicy, GapValue},
    model::{Bucket, LookupError},
    path::{PathExpression, PathTarget, VariableBinding},
    script::Variables,
};

///
/// Resolution
///

#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Resolved(ResolvedInputs),
    Skip,
}

///
/// ResolvedInputs
///
/// Complete finite variable set for one bucket.
///

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedInputs {
    variables: Variables,
    gaps_filled: u32,
}

impl ResolvedInputs {
    #[must_use]
    pub const fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Number of inputs replaced by zero under `InsertZeros`.
    #[must_use]
    pub const fn gaps_filled(&self) -> u32 {
        self.gaps_filled
    }
}

///
/// BucketPathResolver
///

#[derive(Clone, Copy, Debug)]
pub struct BucketPathResolver<'a> {
    bindings: &'a [VariableBinding],
    gap_policy: GapPolicy,
}

impl<'a> BucketPathResolver<'a> {
    #[must_use]
    pub const fn new(bindings: &'a [VariableBinding], gap_policy: GapPolicy) -> Self {
        Self {
            bindings,
            gap_policy,
        }
    }

    /// Check that every binding can be read from this bucket's structure.
    ///
    /// Runs independently of values and gap policy so a malformed binding is
    /// reported even for buckets that would be skipped.
    pub fn check_structure(&self, bucket: &Bucket) -> Result<(), ConfigError> {
        for binding in self.bindings {
            read_raw(bucket, binding.path())?;
        }

        Ok(())
    }

    /// Resolve every binding for one bucket, in binding order.
    ///
    /// Under `Skip` the first gap ends resolution; later bindings are not read.
    pub fn resolve(&self, bucket: &Bucket) -> Result<Resolution, ConfigError> {
        let mut variables = Variables::new();
        let mut gaps_filled = 0_u32;

        for binding in self.bindings {
            let raw = read_raw(bucket, binding.path())?;
            match self.gap_policy.apply(raw, bucket.doc_count()) {
                GapValue::Finite { value, filled } => {
                    if filled {
                        gaps_filled = gaps_filled.saturating_add(1);
                    }
                    variables.insert(binding.variable(), value);
                }
                GapValue::Undefined => return Ok(Resolution::Skip),
            }
        }

        Ok(Resolution::Resolved(ResolvedInputs {
            variables,
            gaps_filled,
        }))
    }
}

/// Read the raw value a path points at, before gap handling.
#[expect(clippy::cast_precision_loss)]
fn read_raw(bucket: &Bucket, path: &PathExpression) -> Result<Option<f64>, ConfigError> {
    match path.target() {
        PathTarget::DocCount => Ok(Some(bucket.doc_count() as f64)),
        PathTarget::Key => bucket
            .key()
            .as_number()
            .map(Some)
            .ok_or_else(|| ConfigError::NonNumericKey {
                bucket: bucket.key().to_string(),
            }),
        PathTarget::Metric(name) => match bucket.aggregations().single_value(name) {
            Ok(value) => Ok(value.value()),
            Err(LookupError::Missing) => Err(ConfigError::UnknownPath {
                path: path.to_string(),
                bucket: bucket.key().to_string(),
            }),
            Err(LookupError::WrongKind(kind)) => Err(ConfigError::NotSingleValue {
                path: path.to_string(),
                bucket: bucket.key().to_string(),
                kind,
            }),
        },
    }
}
