//! Strategy pipeline — base computation plus an ordered modifier chain.
//!
//! A `StrategyConfig` computes a first `ScaleResult` from the workload and
//! its resolved parameters, then hands it through every `ResultModifier`
//! in declared order. A modifier that receives a skipped result must
//! return it unchanged; the pipeline does not enforce this.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use tidescale_core::{ConversionError, ParameterType, ParameterValue, ParameterValues, Workload};

use crate::error::ConfigError;

/// Base computation of a strategy.
pub type ComputeFn =
    dyn Fn(&Workload, &ParameterValues) -> anyhow::Result<ScaleResult> + Send + Sync;

/// Refinement step applied to a previous result.
pub type TransformFn =
    dyn Fn(&Workload, &ParameterValues, ScaleResult) -> anyhow::Result<ScaleResult> + Send + Sync;

/// Outcome of a computation or modifier step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScaleResult {
    pub required_replicas: u32,
    /// Leave the workload untouched this round. Sticky through the chain.
    pub skip: bool,
}

impl ScaleResult {
    pub fn replicas(required_replicas: u32) -> Self {
        Self {
            required_replicas,
            skip: false,
        }
    }

    pub fn skip() -> Self {
        Self {
            required_replicas: 0,
            skip: true,
        }
    }
}

/// Clamp a signed replica computation into the valid replica range.
pub fn clamp_replicas(n: i64) -> u32 {
    n.clamp(0, i64::from(u32::MAX)) as u32
}

/// Final decision for one workload in a round.
#[derive(Debug, Clone)]
pub struct ScaleDecision {
    pub workload: Arc<Workload>,
    pub strategy: String,
    pub required_replicas: u32,
    pub skip: bool,
}

/// Declared type of a required parameter and its optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub ty: ParameterType,
    pub default: Option<ParameterValue>,
}

impl ParameterSpec {
    /// A parameter that must come from an annotation or a provider.
    pub fn required(ty: ParameterType) -> Self {
        Self { ty, default: None }
    }

    pub fn with_default(ty: ParameterType, default: impl Into<ParameterValue>) -> Self {
        Self {
            ty,
            default: Some(default.into()),
        }
    }

    /// The default converted to the declared type, if one is set.
    pub fn default_value(&self) -> Result<Option<ParameterValue>, ConversionError> {
        self.default
            .clone()
            .map(|v| v.convert_to(self.ty))
            .transpose()
    }
}

/// Parameter name → spec.
pub type RequiredParameters = BTreeMap<String, ParameterSpec>;

/// Build a `RequiredParameters` map from literal entries.
pub fn parameters<const N: usize>(entries: [(&str, ParameterSpec); N]) -> RequiredParameters {
    entries
        .into_iter()
        .map(|(name, spec)| (name.to_string(), spec))
        .collect()
}

/// A named refinement step with its own parameter requirements.
#[derive(Clone)]
pub struct ResultModifier {
    name: String,
    required: RequiredParameters,
    transform: Arc<TransformFn>,
}

impl ResultModifier {
    pub fn new<F>(name: impl Into<String>, required: RequiredParameters, transform: F) -> Self
    where
        F: Fn(&Workload, &ParameterValues, ScaleResult) -> anyhow::Result<ScaleResult>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            required,
            transform: Arc::new(transform),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn required_parameters(&self) -> &RequiredParameters {
        &self.required
    }

    pub fn apply(
        &self,
        workload: &Workload,
        values: &ParameterValues,
        previous: ScaleResult,
    ) -> anyhow::Result<ScaleResult> {
        (self.transform)(workload, values, previous)
    }
}

impl fmt::Debug for ResultModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultModifier")
            .field("name", &self.name)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

/// A pluggable scaling algorithm.
#[derive(Clone)]
pub struct StrategyConfig {
    name: String,
    required: RequiredParameters,
    modifiers: Vec<ResultModifier>,
    compute: Arc<ComputeFn>,
    /// Union of `required` and every modifier's requirements, later wins.
    all_required: RequiredParameters,
    /// Same-name declarations with different types: (name, first, second).
    conflicts: Vec<(String, ParameterType, ParameterType)>,
}

impl StrategyConfig {
    pub fn new<F>(name: impl Into<String>, required: RequiredParameters, compute: F) -> Self
    where
        F: Fn(&Workload, &ParameterValues) -> anyhow::Result<ScaleResult> + Send + Sync + 'static,
    {
        let mut strategy = Self {
            name: name.into(),
            all_required: required.clone(),
            required,
            modifiers: Vec::new(),
            compute: Arc::new(compute),
            conflicts: Vec::new(),
        };
        strategy.rebuild_requirements();
        strategy
    }

    /// Append a modifier to the end of the chain.
    pub fn with_modifier(mut self, modifier: ResultModifier) -> Self {
        self.modifiers.push(modifier);
        self.rebuild_requirements();
        self
    }

    pub fn with_modifiers(mut self, modifiers: impl IntoIterator<Item = ResultModifier>) -> Self {
        self.modifiers.extend(modifiers);
        self.rebuild_requirements();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modifiers(&self) -> &[ResultModifier] {
        &self.modifiers
    }

    /// Parameters declared by the base computation only.
    pub fn base_parameters(&self) -> &RequiredParameters {
        &self.required
    }

    /// Full required-parameter union across the base and every modifier.
    ///
    /// On a name declared more than once the last declaration wins.
    pub fn required_parameters(&self) -> &RequiredParameters {
        &self.all_required
    }

    /// True iff every required `(name, type)` is present in `values`.
    pub fn is_ready(&self, values: &ParameterValues) -> bool {
        self.all_required
            .iter()
            .all(|(name, spec)| values.contains(name, spec.ty))
    }

    /// Required names not yet present under their declared type, sorted.
    pub fn missing_parameters(&self, values: &ParameterValues) -> Vec<String> {
        self.all_required
            .iter()
            .filter(|(name, spec)| !values.contains(name, spec.ty))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Run the base computation and the modifier chain.
    ///
    /// The first error aborts the pipeline; no partial decision is returned.
    pub fn execute(
        &self,
        workload: &Arc<Workload>,
        values: &ParameterValues,
    ) -> anyhow::Result<ScaleDecision> {
        let mut result = (self.compute)(workload, values)?;
        for modifier in &self.modifiers {
            let next = modifier.apply(workload, values, result)?;
            if next != result {
                trace!(
                    workload = %workload,
                    modifier = modifier.name(),
                    before = ?result,
                    after = ?next,
                    "modifier changed result"
                );
            }
            result = next;
        }
        Ok(ScaleDecision {
            workload: Arc::clone(workload),
            strategy: self.name.clone(),
            required_replicas: result.required_replicas,
            skip: result.skip,
        })
    }

    /// Check defaults and same-name type collisions.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let declared = std::iter::once(&self.required)
            .chain(self.modifiers.iter().map(|m| &m.required));
        for required in declared {
            for (parameter, spec) in required {
                if let Err(source) = spec.default_value() {
                    errors.push(ConfigError::InvalidDefault {
                        strategy: self.name.clone(),
                        parameter: parameter.clone(),
                        source,
                    });
                }
            }
        }
        for (parameter, first, second) in &self.conflicts {
            errors.push(ConfigError::ConflictingParameterType {
                strategy: self.name.clone(),
                parameter: parameter.clone(),
                first: *first,
                second: *second,
            });
        }
        errors
    }

    fn rebuild_requirements(&mut self) {
        let mut all = self.required.clone();
        let mut conflicts = Vec::new();
        for modifier in &self.modifiers {
            for (name, spec) in &modifier.required {
                if let Some(previous) = all.insert(name.clone(), spec.clone()) {
                    if previous.ty != spec.ty {
                        conflicts.push((name.clone(), previous.ty, spec.ty));
                    }
                }
            }
        }
        self.all_required = all;
        self.conflicts = conflicts;
    }
}

impl fmt::Debug for StrategyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyConfig")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("modifiers", &self.modifiers)
            .finish_non_exhaustive()
    }
}
