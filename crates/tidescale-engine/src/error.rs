//! Engine error types.
//!
//! `ConfigError` is produced by eager validation before any round runs.
//! Everything that goes wrong during a round is reported as a `RoundError`
//! tagged with the owning workload, and never aborts the other workloads.

use std::sync::Arc;

use thiserror::Error;

use tidescale_core::{ConversionError, ParameterType, Workload};

/// Static configuration problems, accumulated by `AutoscalerConfig::validate`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("strategy '{strategy}': default for parameter '{parameter}' is invalid: {source}")]
    InvalidDefault {
        strategy: String,
        parameter: String,
        #[source]
        source: ConversionError,
    },

    #[error(
        "strategy '{strategy}': parameter '{parameter}' is declared as both {first} and {second}"
    )]
    ConflictingParameterType {
        strategy: String,
        parameter: String,
        first: ParameterType,
        second: ParameterType,
    },

    #[error("default strategy '{0}' not found among enabled strategies")]
    UnknownDefaultStrategy(String),

    #[error("default provider '{provider}' for parameter '{parameter}' not found among enabled providers")]
    UnknownDefaultProvider { parameter: String, provider: String },

    #[error("provider '{provider}' set as default for '{parameter}' does not supply a parameter with this name")]
    DefaultProviderMissingParameter { parameter: String, provider: String },

    #[error("strategy '{0}' is enabled more than once")]
    DuplicateStrategy(String),

    #[error("provider '{0}' is enabled more than once")]
    DuplicateProvider(String),
}

/// Per-workload failure to resolve a strategy or a parameter source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SelectionError {
    #[error("strategy not specified and no default configured")]
    StrategyNotSpecified,

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error(
        "provider '{provider}' does not supply parameter '{parameter}' as {expected}{}",
        .available.map(|t| format!(" (it supplies {t})")).unwrap_or_default()
    )]
    ProviderTypeMismatch {
        provider: String,
        parameter: String,
        expected: ParameterType,
        available: Option<ParameterType>,
    },

    #[error("invalid value for parameter '{parameter}': {source}")]
    InvalidLiteral {
        parameter: String,
        #[source]
        source: ConversionError,
    },

    #[error("required parameter '{0}' has no default and no provider")]
    MissingParameter(String),
}

/// Failure of one workload within a round.
#[derive(Debug, Error)]
#[error("failed to get scaling result for {workload}: {kind}")]
pub struct RoundError {
    pub workload: Arc<Workload>,
    /// The strategy selected for the workload, if selection got that far.
    pub strategy: Option<String>,
    #[source]
    pub kind: RoundErrorKind,
}

#[derive(Debug, Error)]
pub enum RoundErrorKind {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("provider '{provider}' failed: {cause:#}")]
    Provider {
        provider: String,
        cause: anyhow::Error,
    },

    #[error("provider '{provider}' supplied an invalid value for '{parameter}': {source}")]
    Conversion {
        provider: String,
        parameter: String,
        #[source]
        source: ConversionError,
    },

    #[error("could not collect all required parameters, missing: {}", .missing.join(", "))]
    IncompleteParameters { missing: Vec<String> },

    #[error("strategy failed: {cause:#}")]
    Strategy { cause: anyhow::Error },
}

impl RoundError {
    pub fn new(workload: Arc<Workload>, strategy: Option<String>, kind: RoundErrorKind) -> Self {
        Self {
            workload,
            strategy,
            kind,
        }
    }

    /// The provider that caused the failure, for provider-scoped errors.
    pub fn provider(&self) -> Option<&str> {
        match &self.kind {
            RoundErrorKind::Provider { provider, .. }
            | RoundErrorKind::Conversion { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_error_display_names_workload() {
        let err = RoundError::new(
            Arc::new(Workload::new("default/worker", "worker")),
            Some("simple".into()),
            RoundErrorKind::IncompleteParameters {
                missing: vec!["max-workers".into(), "queue-length".into()],
            },
        );
        assert_eq!(
            err.to_string(),
            "failed to get scaling result for default/worker: \
             could not collect all required parameters, missing: max-workers, queue-length"
        );
        assert_eq!(err.provider(), None);
    }

    #[test]
    fn provider_errors_carry_provider_name() {
        let err = RoundError::new(
            Arc::new(Workload::new("default/worker", "worker")),
            None,
            RoundErrorKind::Provider {
                provider: "rmq-http".into(),
                cause: anyhow::anyhow!("connection refused"),
            },
        );
        assert_eq!(err.provider(), Some("rmq-http"));
        assert!(err.to_string().ends_with("provider 'rmq-http' failed: connection refused"));
    }

    #[test]
    fn type_mismatch_mentions_available_type() {
        let err = SelectionError::ProviderTypeMismatch {
            provider: "int_provider".into(),
            parameter: "int".into(),
            expected: ParameterType::Float,
            available: Some(ParameterType::Int),
        };
        assert_eq!(
            err.to_string(),
            "provider 'int_provider' does not supply parameter 'int' as float (it supplies int)"
        );
    }
}
