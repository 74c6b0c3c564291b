use crate::{
    error::ConfigError,
    script::{
        env::{ScriptEnv, Variables},
        error::EvaluationError,
        evaluator::{ScalarEvaluator, ScriptOutput},
        params::Params,
    },
};
use serde::Deserialize;
use std::{collections::BTreeMap, fmt, sync::Arc};

///
/// ScriptSource
///
/// Where a script comes from: inline source text or a stored script id.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(try_from = "ScriptSourceRepr")]
pub enum ScriptSource {
    Inline { source: String },
    Stored { id: String },
}

///
/// ScriptSourceRepr
///
/// Request shape: exactly one of `source` or `id`.
///

#[derive(Deserialize)]
struct ScriptSourceRepr {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

impl TryFrom<ScriptSourceRepr> for ScriptSource {
    type Error = ConfigError;

    fn try_from(repr: ScriptSourceRepr) -> Result<Self, Self::Error> {
        match (repr.source, repr.id) {
            (Some(source), None) => Ok(Self::Inline { source }),
            (None, Some(id)) => Ok(Self::Stored { id }),
            (Some(inline), Some(id)) => Err(ConfigError::AmbiguousScript { inline, id }),
            (None, None) => Err(ConfigError::MissingScript),
        }
    }
}

impl fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline { source } => write!(f, "inline '{source}'"),
            Self::Stored { id } => write!(f, "stored '{id}'"),
        }
    }
}

///
/// ScriptSpec
///
/// Script reference plus its static parameters, as declared in the request.
///

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ScriptSpec {
    #[serde(flatten)]
    source: ScriptSource,
    #[serde(default)]
    params: Params,
}

impl ScriptSpec {
    pub fn inline(source: impl Into<String>) -> Self {
        Self {
            source: ScriptSource::Inline {
                source: source.into(),
            },
            params: Params::new(),
        }
    }

    pub fn stored(id: impl Into<String>) -> Self {
        Self {
            source: ScriptSource::Stored { id: id.into() },
            params: Params::new(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub const fn source(&self) -> &ScriptSource {
        &self.source
    }

    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }
}

///
/// CompiledScript
///
/// Evaluator handle bound to its static params, ready to run per bucket.
/// Cloning shares the evaluator.
///

#[derive(Clone)]
pub struct CompiledScript {
    label: String,
    evaluator: Arc<dyn ScalarEvaluator>,
    params: Params,
}

impl CompiledScript {
    pub fn new(label: impl Into<String>, evaluator: impl ScalarEvaluator + 'static) -> Self {
        Self::from_shared(label, Arc::new(evaluator))
    }

    pub fn from_shared(label: impl Into<String>, evaluator: Arc<dyn ScalarEvaluator>) -> Self {
        Self {
            label: label.into(),
            evaluator,
            params: Params::new(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Run the evaluator over one bucket's variables and the static params.
    pub fn evaluate(&self, variables: &Variables) -> Result<ScriptOutput, EvaluationError> {
        self.evaluator
            .evaluate(&ScriptEnv::new(variables, &self.params))
    }
}

impl fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledScript")
            .field("label", &self.label)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

///
/// ScriptCatalog
///
/// Compiled evaluators known to the engine, addressed by inline source text
/// or by stored id. Resolution happens once, before any bucket is visited.
///

#[derive(Clone, Default)]
pub struct ScriptCatalog {
    inline: BTreeMap<String, Arc<dyn ScalarEvaluator>>,
    stored: BTreeMap<String, Arc<dyn ScalarEvaluator>>,
}

impl ScriptCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the evaluator compiled from one inline source text.
    #[must_use]
    pub fn with_inline(
        mut self,
        source: impl Into<String>,
        evaluator: impl ScalarEvaluator + 'static,
    ) -> Self {
        self.inline.insert(source.into(), Arc::new(evaluator));
        self
    }

    /// Register a stored script under its id.
    #[must_use]
    pub fn with_stored(
        mut self,
        id: impl Into<String>,
        evaluator: impl ScalarEvaluator + 'static,
    ) -> Self {
        self.stored.insert(id.into(), Arc::new(evaluator));
        self
    }

    #[must_use]
    pub fn contains(&self, source: &ScriptSource) -> bool {
        self.lookup(source).is_some()
    }

    /// Resolve a declared script into a compiled handle carrying its params.
    pub fn compile(&self, spec: &ScriptSpec) -> Result<CompiledScript, ConfigError> {
        let evaluator = self
            .lookup(spec.source())
            .ok_or_else(|| ConfigError::UnknownScript {
                script: spec.source().to_string(),
            })?;

        Ok(
            CompiledScript::from_shared(spec.source().to_string(), Arc::clone(evaluator))
                .with_params(spec.params().clone()),
        )
    }

    fn lookup(&self, source: &ScriptSource) -> Option<&Arc<dyn ScalarEvaluator>> {
        match source {
            ScriptSource::Inline { source } => self.inline.get(source),
            ScriptSource::Stored { id } => self.stored.get(id),
        }
    }
}

impl fmt::Debug for ScriptCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptCatalog")
            .field("inline", &self.inline.keys().collect::<Vec<_>>())
            .field("stored", &self.stored.keys().collect::<Vec<_>>())
            .finish()
    }
}
