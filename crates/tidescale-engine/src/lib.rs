//! tidescale-engine — turns workload annotations and provider metrics into
//! per-round scaling decisions.
//!
//! The flow of one round:
//! 1. [`selector`] resolves the strategy and the source of every parameter
//! 2. the [`scheduler`] opens one [`session`] per (workload, provider) and
//!    invokes each [`provider`] once with all of its sessions
//! 3. arriving values are type-checked and merged per workload until the
//!    [`strategy`] is ready, then the strategy pipeline runs
//!
//! Every workload ends the round with exactly one decision or one error.

pub mod config;
pub mod error;
pub mod provider;
pub mod scheduler;
pub mod selector;
pub mod session;
pub mod strategy;

pub use config::AutoscalerConfig;
pub use error::{ConfigError, RoundError, RoundErrorKind, SelectionError};
pub use provider::{provider_fn, ProvideFuture, Provider, ProviderConfig};
pub use scheduler::{RoundOutput, RoundReport, Scheduler};
pub use selector::{select, Selection};
pub use session::{ProvidedParameters, ProviderSession, SessionEvent, SessionReceiver};
pub use strategy::{
    clamp_replicas, parameters, ParameterSpec, RequiredParameters, ResultModifier, ScaleDecision,
    ScaleResult, StrategyConfig,
};
