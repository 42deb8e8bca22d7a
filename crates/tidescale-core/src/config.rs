//! tidescale.toml configuration parser.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::workload::Workload;

pub const DEFAULT_ANNOTATION_PREFIX: &str = "tidescale/";
pub const DEFAULT_INTERVAL: &str = "10s";
pub const DEFAULT_RMQ_PROVIDER_NAME: &str = "rmq-http";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_annotation_prefix")]
    pub annotation_prefix: String,
    pub default_strategy: Option<String>,
    /// Round interval, e.g. `"10s"`.
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Parameter name → provider name used when no annotation picks one.
    #[serde(default)]
    pub default_providers: HashMap<String, String>,
    pub rmq_http: Option<RmqHttpConfig>,
    #[serde(default)]
    pub workloads: Vec<Workload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RmqHttpConfig {
    #[serde(default = "default_rmq_name")]
    pub name: String,
    /// Management API base URL, e.g. `http://rabbitmq:15672`.
    pub url: String,
    pub user: String,
    pub password: String,
    /// Per-request timeout, e.g. `"5s"`.
    pub timeout: Option<String>,
}

fn default_annotation_prefix() -> String {
    DEFAULT_ANNOTATION_PREFIX.to_string()
}

fn default_interval() -> String {
    DEFAULT_INTERVAL.to_string()
}

fn default_rmq_name() -> String {
    DEFAULT_RMQ_PROVIDER_NAME.to_string()
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The parsed round interval.
    pub fn interval(&self) -> anyhow::Result<Duration> {
        let interval = parse_duration(&self.interval)
            .with_context(|| format!("invalid interval '{}'", self.interval))?;
        anyhow::ensure!(!interval.is_zero(), "interval must be positive");
        Ok(interval)
    }

    /// Scaffold a minimal config wired to a local RabbitMQ.
    pub fn scaffold() -> Self {
        DaemonConfig {
            annotation_prefix: default_annotation_prefix(),
            default_strategy: Some("simple-queue-based".to_string()),
            interval: default_interval(),
            default_providers: HashMap::from([(
                "queue-length".to_string(),
                DEFAULT_RMQ_PROVIDER_NAME.to_string(),
            )]),
            rmq_http: Some(RmqHttpConfig {
                name: default_rmq_name(),
                url: "http://localhost:15672".to_string(),
                user: "guest".to_string(),
                password: "guest".to_string(),
                timeout: Some("5s".to_string()),
            }),
            workloads: Vec::new(),
        }
    }
}

impl RmqHttpConfig {
    /// The parsed request timeout, defaulting to five seconds.
    pub fn timeout(&self) -> anyhow::Result<Duration> {
        match &self.timeout {
            Some(raw) => {
                parse_duration(raw).with_context(|| format!("invalid rmq_http timeout '{raw}'"))
            }
            None => Ok(Duration::from_secs(5)),
        }
    }
}
