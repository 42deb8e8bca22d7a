//! Workload descriptors handed to each evaluation round.

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A scalable unit evaluated once per round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Opaque reference owned by the embedding caller, e.g. `namespace/name`.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Annotations used to select the strategy and parameter sources.
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    /// Desired replica count currently applied.
    pub replicas: u32,
    /// Replicas reporting ready.
    #[serde(default)]
    pub ready_replicas: u32,
    /// Unix timestamp (seconds) of the last replica change.
    #[serde(default)]
    pub updated_at: u64,
}

impl Workload {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            annotations: HashMap::new(),
            replicas: 0,
            ready_replicas: 0,
            updated_at: 0,
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Set both the desired and the ready replica counts.
    pub fn with_replicas(mut self, replicas: u32, ready_replicas: u32) -> Self {
        self.replicas = replicas;
        self.ready_replicas = ready_replicas;
        self
    }

    pub fn with_updated_at(mut self, updated_at: u64) -> Self {
        self.updated_at = updated_at;
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Every desired replica is ready.
    pub fn is_stable(&self) -> bool {
        self.ready_replicas == self.replicas
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let w = Workload::new("default/worker", "worker")
            .with_annotation("tidescale/strategy", "simple-queue-based")
            .with_replicas(3, 2)
            .with_updated_at(1000);

        assert_eq!(w.annotation("tidescale/strategy"), Some("simple-queue-based"));
        assert_eq!(w.replicas, 3);
        assert!(!w.is_stable());
        assert_eq!(w.updated_at, 1000);
        assert_eq!(w.to_string(), "default/worker");
    }

    #[test]
    fn epoch_secs_returns_reasonable_value() {
        // After 2024-01-01.
        assert!(epoch_secs() > 1_704_067_200);
    }
}
