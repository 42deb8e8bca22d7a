//! Strategy and parameter-source selection from workload annotations.

use std::collections::BTreeMap;
use std::sync::Arc;

use tidescale_core::{ParameterValues, Workload};

use crate::config::AutoscalerConfig;
use crate::error::SelectionError;
use crate::strategy::StrategyConfig;

/// Annotation suffix naming the strategy of a workload.
pub const STRATEGY_ANNOTATION: &str = "strategy";

/// Provider name → parameter names the workload needs from it.
pub type ProviderRequirements = BTreeMap<String, Vec<String>>;

/// Where every required parameter of one workload comes from.
#[derive(Debug, Clone)]
pub struct Selection {
    pub strategy: Arc<StrategyConfig>,
    pub requirements: ProviderRequirements,
    /// Store pre-seeded with literal and default values.
    pub static_values: ParameterValues,
}

/// Resolve the strategy for `workload`.
pub fn select_strategy(
    config: &AutoscalerConfig,
    workload: &Workload,
) -> Result<Arc<StrategyConfig>, SelectionError> {
    let key = config.annotation_key(STRATEGY_ANNOTATION);
    let name = match workload.annotation(&key) {
        Some(name) => name,
        None => config
            .default_strategy()
            .ok_or(SelectionError::StrategyNotSpecified)?,
    };
    config
        .strategy(name)
        .cloned()
        .ok_or_else(|| SelectionError::UnknownStrategy(name.to_string()))
}

/// Resolve a source for every parameter `strategy` requires.
pub fn select_parameters(
    config: &AutoscalerConfig,
    strategy: &StrategyConfig,
    workload: &Workload,
) -> Result<(ProviderRequirements, ParameterValues), SelectionError> {
    let mut requirements = ProviderRequirements::new();
    let mut static_values = ParameterValues::new();

    for (parameter, spec) in strategy.required_parameters() {
        let key = config.annotation_key(parameter);

        if let Some(raw) = workload.annotation(&key) {
            if let Some(provider) = config.provider(raw) {
                let available = provider.supplies(parameter);
                if available != Some(spec.ty) {
                    return Err(SelectionError::ProviderTypeMismatch {
                        provider: provider.name().to_string(),
                        parameter: parameter.clone(),
                        expected: spec.ty,
                        available,
                    });
                }
                requirements
                    .entry(provider.name().to_string())
                    .or_default()
                    .push(parameter.clone());
                continue;
            }

            let invalid = |source| SelectionError::InvalidLiteral {
                parameter: parameter.clone(),
                source,
            };
            let value = spec.ty.parse(raw).map_err(invalid)?;
            static_values
                .insert(parameter.clone(), value, spec.ty)
                .map_err(invalid)?;
            continue;
        }

        let default_provider = config
            .default_providers()
            .get(parameter)
            .and_then(|name| config.provider(name))
            .filter(|p| p.supplies(parameter) == Some(spec.ty));
        if let Some(provider) = default_provider {
            requirements
                .entry(provider.name().to_string())
                .or_default()
                .push(parameter.clone());
            continue;
        }

        let invalid = |source| SelectionError::InvalidLiteral {
            parameter: parameter.clone(),
            source,
        };
        match spec.default_value().map_err(invalid)? {
            Some(value) => static_values
                .insert(parameter.clone(), value, spec.ty)
                .map_err(invalid)?,
            None => return Err(SelectionError::MissingParameter(parameter.clone())),
        }
    }

    Ok((requirements, static_values))
}

/// Run both selection steps.
///
/// On failure the strategy name is returned alongside the error when the
/// strategy was already resolved.
pub fn select(
    config: &AutoscalerConfig,
    workload: &Workload,
) -> Result<Selection, (Option<String>, SelectionError)> {
    let strategy = select_strategy(config, workload).map_err(|e| (None, e))?;
    let (requirements, static_values) = select_parameters(config, &strategy, workload)
        .map_err(|e| (Some(strategy.name().to_string()), e))?;
    Ok(Selection {
        strategy,
        requirements,
        static_values,
    })
}
