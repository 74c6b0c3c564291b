//! Module: path
//! Responsibility: bucket path syntax and variable binding declarations.
//! Does not own: lookups against concrete buckets (see `resolve`).
//! Boundary: paths here are single-level sibling references; multi-level
//! paths are flattened by the request layer before they reach this crate.


use crate::{POSITIONAL_VARIABLE_PREFIX, error::ConfigError};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{MapAccess, Visitor},
};
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error as ThisError;

///
/// CONSTANTS
///

/// Special path resolving to the bucket's document count.
pub const COUNT_PATH: &str = "_count";

/// Special path resolving to the bucket's numeric key.
pub const KEY_PATH: &str = "_key";

const MULTI_LEVEL_SEPARATORS: [char; 2] = ['>', '.'];

///
/// PathSyntaxError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum PathSyntaxError {
    #[error("path is empty")]
    Empty,

    #[error("path contains whitespace")]
    Whitespace,

    #[error("multi-level separator '{separator}' is not supported for sibling paths")]
    MultiLevel { separator: char },
}

///
/// PathTarget
///
/// What a path reads from a bucket.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathTarget {
    DocCount,
    Key,
    Metric(String),
}

///
/// PathExpression
///
/// One validated reference to a value reachable from a bucket.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathExpression {
    raw: String,
    target: PathTarget,
}

impl PathExpression {
    pub fn parse(raw: &str) -> Result<Self, PathSyntaxError> {
        if raw.is_empty() {
            return Err(PathSyntaxError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(PathSyntaxError::Whitespace);
        }
        if let Some(separator) = raw.chars().find(|c| MULTI_LEVEL_SEPARATORS.contains(c)) {
            return Err(PathSyntaxError::MultiLevel { separator });
        }

        let target = match raw {
            COUNT_PATH => PathTarget::DocCount,
            KEY_PATH => PathTarget::Key,
            name => PathTarget::Metric(name.to_string()),
        };

        Ok(Self {
            raw: raw.to_string(),
            target,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub const fn target(&self) -> &PathTarget {
        &self.target
    }

    /// Return the sibling aggregation name, or `None` for `_count` / `_key`.
    #[must_use]
    pub fn metric_name(&self) -> Option<&str> {
        match &self.target {
            PathTarget::Metric(name) => Some(name),
            PathTarget::DocCount | PathTarget::Key => None,
        }
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PathExpression {
    type Err = PathSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PathExpression {
    type Error = PathSyntaxError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<PathExpression> for String {
    fn from(path: PathExpression) -> Self {
        path.raw
    }
}

///
/// VariableBinding
///
/// One variable name bound to the path that supplies its value.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VariableBinding {
    variable: String,
    path: PathExpression,
}

impl VariableBinding {
    #[must_use]
    pub const fn variable(&self) -> &str {
        self.variable.as_str()
    }

    #[must_use]
    pub const fn path(&self) -> &PathExpression {
        &self.path
    }
}

/// Return the conventional variable name for the path at `index`.
#[must_use]
pub fn positional_variable(index: usize) -> String {
    format!("{POSITIONAL_VARIABLE_PREFIX}{index}")
}

///
/// BucketsPath
///
/// Declared inputs of a bucket script: either an ordered list of paths bound
/// to `_value0.._valueN` in declaration order, or user-named variables.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(try_from = "BucketsPathRepr")]
pub enum BucketsPath {
    Positional(Vec<PathExpression>),
    Named(BTreeMap<String, PathExpression>),
}

impl BucketsPath {
    /// Build positional bindings from path strings in declaration order.
    pub fn positional<I, S>(paths: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths = paths
            .into_iter()
            .map(|path| parse_path(path.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if paths.is_empty() {
            return Err(ConfigError::EmptyBucketsPath);
        }

        Ok(Self::Positional(paths))
    }

    /// Build named bindings, rejecting empty or repeated variable names.
    pub fn named<I, K, S>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: AsRef<str>,
    {
        let mut named = BTreeMap::new();
        for (variable, path) in pairs {
            let variable = variable.into();
            if variable.is_empty() {
                return Err(ConfigError::EmptyVariableName);
            }
            let path = parse_path(path.as_ref())?;
            if named.insert(variable.clone(), path).is_some() {
                return Err(ConfigError::DuplicateVariable { name: variable });
            }
        }
        if named.is_empty() {
            return Err(ConfigError::EmptyBucketsPath);
        }

        Ok(Self::Named(named))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(paths) => paths.len(),
            Self::Named(named) => named.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lower the declaration into variable bindings.
    ///
    /// Positional bindings keep declaration order; named bindings follow
    /// variable-name order.
    #[must_use]
    pub fn bindings(&self) -> Vec<VariableBinding> {
        match self {
            Self::Positional(paths) => paths
                .iter()
                .enumerate()
                .map(|(index, path)| VariableBinding {
                    variable: positional_variable(index),
                    path: path.clone(),
                })
                .collect(),
            Self::Named(named) => named
                .iter()
                .map(|(variable, path)| VariableBinding {
                    variable: variable.clone(),
                    path: path.clone(),
                })
                .collect(),
        }
    }
}

fn parse_path(raw: &str) -> Result<PathExpression, ConfigError> {
    PathExpression::parse(raw).map_err(|source| ConfigError::InvalidPath {
        path: raw.to_string(),
        source,
    })
}

///
/// BucketsPathRepr
///
/// Accepted configuration shapes: one path, a list, or a name->path map.
///

#[derive(Deserialize)]
#[serde(untagged)]
enum BucketsPathRepr {
    Single(String),
    Positional(Vec<String>),
    Named(NamedEntries),
}

///
/// NamedEntries
///
/// Name->path map entries in document order. Repeated names are kept.
///

struct NamedEntries(Vec<(String, String)>);

impl<'de> Deserialize<'de> for NamedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = NamedEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of variable names to bucket paths")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, String>()? {
                    entries.push(entry);
                }

                Ok(NamedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl TryFrom<BucketsPathRepr> for BucketsPath {
    type Error = ConfigError;

    fn try_from(repr: BucketsPathRepr) -> Result<Self, Self::Error> {
        match repr {
            BucketsPathRepr::Single(path) => Self::positional([path]),
            BucketsPathRepr::Positional(paths) => Self::positional(paths),
            BucketsPathRepr::Named(NamedEntries(entries)) => Self::named(entries),
        }
    }
}
