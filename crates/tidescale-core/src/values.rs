//! Typed parameter store.
//!
//! `ParameterValues` keeps one map per `ParameterType`. The partition a
//! name lives in fixes its type: inserting a name under one kind evicts
//! it from every other partition, so a name is held at most once.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use crate::error::ConversionError;
use crate::parameter::{ParameterType, ParameterValue};

/// Heterogeneous, name-keyed parameter container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterValues {
    ints: HashMap<String, i64>,
    floats: HashMap<String, f64>,
    strings: HashMap<String, String>,
    bools: HashMap<String, bool>,
    durations: HashMap<String, Duration>,
}

impl ParameterValues {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `name` as type `ty`.
    ///
    /// Fails if the value is not representable as `ty`; the store is left
    /// untouched in that case.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ParameterValue>,
        ty: ParameterType,
    ) -> Result<(), ConversionError> {
        let value = value.into().convert_to(ty)?;
        let name = name.into();
        self.evict_except(&name, ty);
        match value {
            ParameterValue::Int(v) => {
                self.ints.insert(name, v);
            }
            ParameterValue::Float(v) => {
                self.floats.insert(name, v);
            }
            ParameterValue::String(v) => {
                self.strings.insert(name, v);
            }
            ParameterValue::Bool(v) => {
                self.bools.insert(name, v);
            }
            ParameterValue::Duration(v) => {
                self.durations.insert(name, v);
            }
        }
        Ok(())
    }

    /// True iff `name` is present in exactly the `ty` partition.
    pub fn contains(&self, name: &str, ty: ParameterType) -> bool {
        match ty {
            ParameterType::Int => self.ints.contains_key(name),
            ParameterType::Float => self.floats.contains_key(name),
            ParameterType::String => self.strings.contains_key(name),
            ParameterType::Bool => self.bools.contains_key(name),
            ParameterType::Duration => self.durations.contains_key(name),
        }
    }

    /// Union of `self` and `other`; on a name collision `other` wins.
    pub fn merge(&self, other: &ParameterValues) -> ParameterValues {
        let mut merged = self.clone();
        for (name, value) in other.iter() {
            let ty = value.kind();
            merged.evict_except(name, ty);
            match value {
                ParameterValue::Int(v) => {
                    merged.ints.insert(name.to_string(), v);
                }
                ParameterValue::Float(v) => {
                    merged.floats.insert(name.to_string(), v);
                }
                ParameterValue::String(v) => {
                    merged.strings.insert(name.to_string(), v);
                }
                ParameterValue::Bool(v) => {
                    merged.bools.insert(name.to_string(), v);
                }
                ParameterValue::Duration(v) => {
                    merged.durations.insert(name.to_string(), v);
                }
            }
        }
        merged
    }

    /// Total number of entries across all partitions.
    pub fn len(&self) -> usize {
        self.ints.len()
            + self.floats.len()
            + self.strings.len()
            + self.bools.len()
            + self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `name` in the `ty` partition.
    pub fn get(&self, name: &str, ty: ParameterType) -> Option<ParameterValue> {
        match ty {
            ParameterType::Int => self.int(name).map(ParameterValue::Int),
            ParameterType::Float => self.float(name).map(ParameterValue::Float),
            ParameterType::String => self.string(name).map(ParameterValue::from),
            ParameterType::Bool => self.bool(name).map(ParameterValue::Bool),
            ParameterType::Duration => self.duration(name).map(ParameterValue::Duration),
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.ints.get(name).copied()
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.floats.get(name).copied()
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.strings.get(name).map(String::as_str)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.bools.get(name).copied()
    }

    pub fn duration(&self, name: &str) -> Option<Duration> {
        self.durations.get(name).copied()
    }

    /// Iterate over every entry as `(name, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ParameterValue)> + '_ {
        let ints = self.ints.iter().map(|(k, v)| (k.as_str(), ParameterValue::Int(*v)));
        let floats = self.floats.iter().map(|(k, v)| (k.as_str(), ParameterValue::Float(*v)));
        let strings = self
            .strings
            .iter()
            .map(|(k, v)| (k.as_str(), ParameterValue::String(v.clone())));
        let bools = self.bools.iter().map(|(k, v)| (k.as_str(), ParameterValue::Bool(*v)));
        let durations = self
            .durations
            .iter()
            .map(|(k, v)| (k.as_str(), ParameterValue::Duration(*v)));
        ints.chain(floats).chain(strings).chain(bools).chain(durations)
    }

    fn evict_except(&mut self, name: &str, keep: ParameterType) {
        for ty in ParameterType::ALL {
            if ty == keep {
                continue;
            }
            match ty {
                ParameterType::Int => {
                    self.ints.remove(name);
                }
                ParameterType::Float => {
                    self.floats.remove(name);
                }
                ParameterType::String => {
                    self.strings.remove(name);
                }
                ParameterType::Bool => {
                    self.bools.remove(name);
                }
                ParameterType::Duration => {
                    self.durations.remove(name);
                }
            }
        }
    }
}

impl fmt::Display for ParameterValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sorted: BTreeMap<&str, ParameterValue> = self.iter().collect();
        f.write_str("{")?;
        for (i, (name, value)) in sorted.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str("}")
    }
}
