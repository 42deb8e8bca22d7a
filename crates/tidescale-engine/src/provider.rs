//! Provider contract.
//!
//! A provider is invoked once per round with the sessions of every
//! workload that needs it. It owns those sessions and must `finish` each
//! one exactly once on every path, including after observing cancellation.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tidescale_core::ParameterType;

use crate::session::ProviderSession;

/// Future returned by [`Provider::provide`].
pub type ProvideFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// An asynchronous source of named parameter values.
pub trait Provider: Send + Sync {
    fn provide(self: Arc<Self>, sessions: Vec<ProviderSession>) -> ProvideFuture;
}

/// Adapter turning an async closure into a [`Provider`].
pub struct FnProvider<F>(F);

/// Wrap `f` as a provider.
pub fn provider_fn<F, Fut>(f: F) -> FnProvider<F>
where
    F: Fn(Vec<ProviderSession>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    FnProvider(f)
}

impl<F, Fut> Provider for FnProvider<F>
where
    F: Fn(Vec<ProviderSession>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn provide(self: Arc<Self>, sessions: Vec<ProviderSession>) -> ProvideFuture {
        Box::pin((self.0)(sessions))
    }
}

/// A named provider plus the parameters it can supply.
#[derive(Clone)]
pub struct ProviderConfig {
    name: String,
    available: BTreeMap<String, ParameterType>,
    provider: Arc<dyn Provider>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, provider: impl Provider + 'static) -> Self {
        Self::from_arc(name, Arc::new(provider))
    }

    pub fn from_arc(name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        Self {
            name: name.into(),
            available: BTreeMap::new(),
            provider,
        }
    }

    /// Declare a parameter this provider can supply.
    pub fn with_parameter(mut self, name: impl Into<String>, ty: ParameterType) -> Self {
        self.available.insert(name.into(), ty);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn available(&self) -> &BTreeMap<String, ParameterType> {
        &self.available
    }

    /// The type this provider supplies `parameter` as, if at all.
    pub fn supplies(&self, parameter: &str) -> Option<ParameterType> {
        self.available.get(parameter).copied()
    }

    pub fn provider(&self) -> Arc<dyn Provider> {
        Arc::clone(&self.provider)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("available", &self.available)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tidescale_core::{ParameterValue, Workload};

    use super::*;
    use crate::session::{self, SessionEvent};

    #[tokio::test]
    async fn closure_provider_answers_each_session() {
        let config = ProviderConfig::new(
            "static",
            provider_fn(|sessions: Vec<ProviderSession>| async move {
                for s in sessions {
                    let values = HashMap::from([(
                        "queue-length".to_string(),
                        ParameterValue::Int(s.workload().replicas as i64 * 10),
                    )]);
                    s.put_result(values).await;
                    s.finish();
                }
            }),
        )
        .with_parameter("queue-length", ParameterType::Int);

        assert_eq!(config.supplies("queue-length"), Some(ParameterType::Int));
        assert_eq!(config.supplies("offset"), None);

        let (producer, mut consumer) = session::open(
            Arc::new(Workload::new("a", "a").with_replicas(3, 3)),
            config.name(),
            vec!["queue-length".into()],
        );
        tokio::spawn(config.provider().provide(vec![producer]));

        match consumer.next_result().await {
            Some(SessionEvent::Values(v)) => {
                assert_eq!(v["queue-length"], ParameterValue::Int(30));
            }
            other => panic!("expected values, got {other:?}"),
        }
        assert!(consumer.next_result().await.is_none());
    }
}
