//! Parameter kinds and values.
//!
//! `ParameterType` is the closed registry of kinds a strategy may declare;
//! `ParameterValue` is the tagged value carried through providers, the
//! selector and the parameter store.

use std::fmt;
use std::time::Duration;

use crate::duration::parse_duration;
use crate::error::ConversionError;

/// Name of a parameter, e.g. `"queue-length"`.
pub type ParameterName = String;

/// A supported parameter kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterType {
    Int,
    Float,
    String,
    Bool,
    Duration,
}

impl ParameterType {
    /// Every supported kind, in partition order.
    pub const ALL: [ParameterType; 5] = [
        ParameterType::Int,
        ParameterType::Float,
        ParameterType::String,
        ParameterType::Bool,
        ParameterType::Duration,
    ];

    /// Canonical lowercase name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Duration => "duration",
        }
    }

    /// Parse a textual value (annotation literal, config entry) as this kind.
    pub fn parse(self, raw: &str) -> Result<ParameterValue, ConversionError> {
        match self {
            Self::Int => raw
                .parse::<i64>()
                .map(ParameterValue::Int)
                .map_err(|e| ConversionError::parse(raw, self, e)),
            Self::Float => raw
                .parse::<f64>()
                .map(ParameterValue::Float)
                .map_err(|e| ConversionError::parse(raw, self, e)),
            Self::String => Ok(ParameterValue::String(raw.to_string())),
            Self::Bool => parse_bool(raw)
                .map(ParameterValue::Bool)
                .ok_or_else(|| ConversionError::parse(raw, self, "expected one of 1, 0, t, f, true, false")),
            Self::Duration => parse_duration(raw)
                .map(ParameterValue::Duration)
                .map_err(|e| ConversionError::parse(raw, self, e)),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

/// A parameter value tagged with its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Duration(Duration),
}

impl ParameterValue {
    /// The kind this value currently carries.
    pub fn kind(&self) -> ParameterType {
        match self {
            Self::Int(_) => ParameterType::Int,
            Self::Float(_) => ParameterType::Float,
            Self::String(_) => ParameterType::String,
            Self::Bool(_) => ParameterType::Bool,
            Self::Duration(_) => ParameterType::Duration,
        }
    }

    /// Convert into the native representation of `target`.
    ///
    /// Matching kinds always convert. Integers widen to floats and
    /// integral floats narrow to integers; every other pairing fails.
    pub fn convert_to(self, target: ParameterType) -> Result<ParameterValue, ConversionError> {
        match (self, target) {
            (v, t) if v.kind() == t => Ok(v),
            (Self::Int(i), ParameterType::Float) => Ok(Self::Float(i as f64)),
            (Self::Float(f), ParameterType::Int)
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 =>
            {
                Ok(Self::Int(f as i64))
            }
            (v, t) => Err(ConversionError::Incompatible {
                value: v.to_string(),
                actual: v.kind(),
                expected: t,
            }),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "'{v}'"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Duration(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for ParameterValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Duration> for ParameterValue {
    fn from(v: Duration) -> Self {
        Self::Duration(v)
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
