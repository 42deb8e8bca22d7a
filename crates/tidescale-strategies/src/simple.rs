//! `simple-queue-based`: one worker per `messages-per-worker` queued
//! messages, plus a constant `offset`.

use tracing::debug;

use tidescale_core::ParameterType;
use tidescale_engine::{clamp_replicas, parameters, ParameterSpec, ScaleResult, StrategyConfig};

use crate::modifiers::{
    cooldown_delay_with_clock, min_max, override_limits, quick_unscale_with_clock, safe_unscale,
    skip_unstable, with_steps,
};
use crate::names::*;
use crate::{int_param, system_clock, Clock};

pub const SIMPLE_QUEUE_BASED: &str = "simple-queue-based";

pub fn simple_queue_based() -> StrategyConfig {
    simple_queue_based_with_clock(system_clock())
}

/// The strategy with an explicit time source for its time-based modifiers.
pub fn simple_queue_based_with_clock(clock: Clock) -> StrategyConfig {
    StrategyConfig::new(
        SIMPLE_QUEUE_BASED,
        parameters([
            (QUEUE_LENGTH, ParameterSpec::required(ParameterType::Int)),
            (MESSAGES_PER_WORKER, ParameterSpec::with_default(ParameterType::Int, 1)),
            (OFFSET, ParameterSpec::with_default(ParameterType::Int, 2)),
        ]),
        |workload, values| {
            let queue = int_param(values, QUEUE_LENGTH)?;
            let per_worker = int_param(values, MESSAGES_PER_WORKER)?;
            let offset = int_param(values, OFFSET)?;
            anyhow::ensure!(per_worker > 0, "messages-per-worker must be positive, got {per_worker}");

            let workers = (queue.max(0) as f64 / per_worker as f64).ceil() as i64;
            let required = clamp_replicas(workers.saturating_add(offset));
            if required == workload.replicas {
                debug!(workload = %workload, replicas = required, "already at required replicas");
                return Ok(ScaleResult::skip());
            }
            debug!(
                workload = %workload,
                replicas = workload.replicas,
                required,
                queue,
                per_worker,
                offset,
                "required replicas changed"
            );
            Ok(ScaleResult::replicas(required))
        },
    )
    .with_modifiers([
        with_steps(),
        min_max(),
        quick_unscale_with_clock(clock.clone()),
        safe_unscale(),
        override_limits(),
        cooldown_delay_with_clock(clock),
        skip_unstable(),
    ])
}
