//! Conversion errors for parameter values.

use thiserror::Error;

use crate::parameter::ParameterType;

/// A raw value could not be turned into a value of the declared type.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversionError {
    #[error("cannot parse '{raw}' as {expected}: {reason}")]
    Parse {
        raw: String,
        expected: ParameterType,
        reason: String,
    },

    #[error("{actual} value {value} is not representable as {expected}")]
    Incompatible {
        value: String,
        actual: ParameterType,
        expected: ParameterType,
    },
}

impl ConversionError {
    pub(crate) fn parse(raw: &str, expected: ParameterType, reason: impl ToString) -> Self {
        Self::Parse {
            raw: raw.to_string(),
            expected,
            reason: reason.to_string(),
        }
    }

    /// The type the value was supposed to have.
    pub fn expected(&self) -> ParameterType {
        match self {
            Self::Parse { expected, .. } | Self::Incompatible { expected, .. } => *expected,
        }
    }
}
