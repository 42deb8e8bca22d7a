//! tidescale-providers — parameter providers for the decision engine.
//!
//! - [`annotations`]: declarative binding of per-workload provider settings
//! - [`rmq_http`]: queue length from the RabbitMQ management HTTP API

pub mod annotations;
pub mod rmq_http;

pub use annotations::{AnnotationTable, BindError};
pub use rmq_http::{RmqError, RmqHttpProvider};

use tidescale_core::DaemonConfig;
use tidescale_engine::ProviderConfig;

/// Every provider enabled by the daemon configuration.
pub fn configured_providers(config: &DaemonConfig) -> anyhow::Result<Vec<ProviderConfig>> {
    let mut providers = Vec::new();
    if let Some(rmq) = &config.rmq_http {
        let provider = RmqHttpProvider::new(rmq, config.annotation_prefix.clone())?;
        providers.push(provider.into_provider_config());
    }
    Ok(providers)
}
