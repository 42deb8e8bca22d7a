//! tidescale-strategies — the built-in `simple-queue-based` strategy and
//! its result modifiers.
//!
//! ```text
//! required = ceil(queue-length / messages-per-worker) + offset
//! required == replicas  →  skip
//!
//! then: with-steps → min-max → quick-unscale → safe-unscale
//!       → override-limits → cooldown-delay → skip-unstable
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use tidescale_core::{epoch_secs, ParameterValues};
use tidescale_engine::StrategyConfig;

pub mod modifiers;
pub mod names;
pub mod simple;

pub use simple::{simple_queue_based, simple_queue_based_with_clock, SIMPLE_QUEUE_BASED};

/// Source of "now" in epoch seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Wall clock.
pub fn system_clock() -> Clock {
    Arc::new(epoch_secs)
}

/// Every strategy this crate ships.
pub fn builtin_strategies() -> Vec<StrategyConfig> {
    vec![simple_queue_based()]
}

pub(crate) fn int_param(values: &ParameterValues, name: &str) -> anyhow::Result<i64> {
    values
        .int(name)
        .with_context(|| format!("int parameter '{name}' not resolved"))
}

pub(crate) fn bool_param(values: &ParameterValues, name: &str) -> anyhow::Result<bool> {
    values
        .bool(name)
        .with_context(|| format!("bool parameter '{name}' not resolved"))
}

pub(crate) fn duration_param(values: &ParameterValues, name: &str) -> anyhow::Result<Duration> {
    values
        .duration(name)
        .with_context(|| format!("duration parameter '{name}' not resolved"))
}
