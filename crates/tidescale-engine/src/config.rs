//! Engine configuration: enabled strategies and providers plus the
//! annotation conventions used to pick between them.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tidescale_core::config::DEFAULT_ANNOTATION_PREFIX;

use crate::error::ConfigError;
use crate::provider::ProviderConfig;
use crate::strategy::StrategyConfig;

/// Static configuration shared read-only by every round.
#[derive(Debug, Clone)]
pub struct AutoscalerConfig {
    strategies: Vec<Arc<StrategyConfig>>,
    providers: Vec<ProviderConfig>,
    annotation_prefix: String,
    default_strategy: Option<String>,
    /// Parameter name → provider name.
    default_providers: BTreeMap<String, String>,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
            providers: Vec::new(),
            annotation_prefix: DEFAULT_ANNOTATION_PREFIX.to_string(),
            default_strategy: None,
            default_providers: BTreeMap::new(),
        }
    }
}

impl AutoscalerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: StrategyConfig) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    pub fn with_strategies(mut self, strategies: impl IntoIterator<Item = StrategyConfig>) -> Self {
        self.strategies.extend(strategies.into_iter().map(Arc::new));
        self
    }

    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_annotation_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.annotation_prefix = prefix.into();
        self
    }

    pub fn with_default_strategy(mut self, name: impl Into<String>) -> Self {
        self.default_strategy = Some(name.into());
        self
    }

    pub fn with_default_provider(
        mut self,
        parameter: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        self.default_providers
            .insert(parameter.into(), provider.into());
        self
    }

    pub fn strategies(&self) -> &[Arc<StrategyConfig>] {
        &self.strategies
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn annotation_prefix(&self) -> &str {
        &self.annotation_prefix
    }

    pub fn default_strategy(&self) -> Option<&str> {
        self.default_strategy.as_deref()
    }

    pub fn default_providers(&self) -> &BTreeMap<String, String> {
        &self.default_providers
    }

    pub fn strategy(&self, name: &str) -> Option<&Arc<StrategyConfig>> {
        self.strategies.iter().find(|s| s.name() == name)
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// Full annotation key for `suffix`, e.g. `tidescale/strategy`.
    pub fn annotation_key(&self, suffix: &str) -> String {
        format!("{}{}", self.annotation_prefix, suffix)
    }

    /// Check the whole configuration, returning every problem found.
    ///
    /// An empty result means the configuration is usable.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let mut seen = HashSet::new();
        for strategy in &self.strategies {
            if !seen.insert(strategy.name()) {
                errors.push(ConfigError::DuplicateStrategy(strategy.name().to_string()));
            }
            errors.extend(strategy.validate());
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name()) {
                errors.push(ConfigError::DuplicateProvider(provider.name().to_string()));
            }
        }

        if let Some(name) = &self.default_strategy {
            if self.strategy(name).is_none() {
                errors.push(ConfigError::UnknownDefaultStrategy(name.clone()));
            }
        }

        for (parameter, provider) in &self.default_providers {
            match self.provider(provider) {
                None => errors.push(ConfigError::UnknownDefaultProvider {
                    parameter: parameter.clone(),
                    provider: provider.clone(),
                }),
                Some(p) if p.supplies(parameter).is_none() => {
                    errors.push(ConfigError::DefaultProviderMissingParameter {
                        parameter: parameter.clone(),
                        provider: provider.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use tidescale_core::ParameterType;

    use super::*;
    use crate::provider::provider_fn;
    use crate::session::ProviderSession;
    use crate::strategy::{parameters, ParameterSpec, ScaleResult};

    fn noop_provider(name: &str) -> ProviderConfig {
        ProviderConfig::new(
            name,
            provider_fn(|sessions: Vec<ProviderSession>| async move {
                sessions.into_iter().for_each(ProviderSession::finish);
            }),
        )
        .with_parameter("queue-length", ParameterType::Int)
    }

    fn strategy(name: &str) -> StrategyConfig {
        StrategyConfig::new(
            name,
            parameters([("queue-length", ParameterSpec::required(ParameterType::Int))]),
            |_, _| Ok(ScaleResult::replicas(1)),
        )
    }

    #[test]
    fn valid_config_has_no_errors() {
        let config = AutoscalerConfig::new()
            .with_strategy(strategy("s1"))
            .with_provider(noop_provider("rmq"))
            .with_default_strategy("s1")
            .with_default_provider("queue-length", "rmq");

        assert!(config.validate().is_empty());
        assert_eq!(config.annotation_key("strategy"), "tidescale/strategy");
        assert!(config.strategy("s1").is_some());
        assert!(config.provider("rmq").is_some());
    }

    #[test]
    fn errors_accumulate() {
        let bad_default = StrategyConfig::new(
            "bad",
            parameters([("offset", ParameterSpec::with_default(ParameterType::Bool, 3))]),
            |_, _| Ok(ScaleResult::replicas(1)),
        );
        let config = AutoscalerConfig::new()
            .with_strategy(strategy("s1"))
            .with_strategy(strategy("s1"))
            .with_strategy(bad_default)
            .with_provider(noop_provider("rmq"))
            .with_provider(noop_provider("rmq"))
            .with_default_strategy("missing")
            .with_default_provider("queue-length", "nope")
            .with_default_provider("offset", "rmq");

        let errors = config.validate();
        assert_eq!(errors.len(), 6, "{errors:?}");
        assert!(errors.contains(&ConfigError::DuplicateStrategy("s1".into())));
        assert!(errors.contains(&ConfigError::DuplicateProvider("rmq".into())));
        assert!(errors.contains(&ConfigError::UnknownDefaultStrategy("missing".into())));
        assert!(errors.contains(&ConfigError::UnknownDefaultProvider {
            parameter: "queue-length".into(),
            provider: "nope".into(),
        }));
        assert!(errors.contains(&ConfigError::DefaultProviderMissingParameter {
            parameter: "offset".into(),
            provider: "rmq".into(),
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidDefault { strategy, .. } if strategy == "bad")));
    }

    #[test]
    fn custom_prefix() {
        let config = AutoscalerConfig::new().with_annotation_prefix("acme.io/");
        assert_eq!(config.annotation_key("queue-length"), "acme.io/queue-length");
    }
}
