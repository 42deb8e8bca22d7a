//! Result modifiers for queue-based strategies.
//!
//! Every modifier hands a skipped result through untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use tidescale_core::ParameterType;
use tidescale_engine::{clamp_replicas, parameters, ParameterSpec, ResultModifier, ScaleResult};

use crate::names::*;
use crate::{bool_param, duration_param, int_param, system_clock, Clock};

/// Limit a replica change to at most `steps` per round.
///
/// A change smaller than `steps` passes through. `steps <= 0` disables the
/// limit.
pub fn with_steps() -> ResultModifier {
    ResultModifier::new(
        "with-steps",
        parameters([(STEPS, ParameterSpec::with_default(ParameterType::Int, 2))]),
        |workload, values, prev| {
            if prev.skip {
                return Ok(prev);
            }
            let steps = int_param(values, STEPS)?;
            let current = i64::from(workload.replicas);
            let change = i64::from(prev.required_replicas) - current;
            if steps <= 0 || change.abs() < steps {
                return Ok(prev);
            }
            let limited = clamp_replicas(current + steps * change.signum());
            debug!(
                workload = %workload,
                change,
                steps,
                replicas = limited,
                "replica change exceeds step limit"
            );
            Ok(ScaleResult::replicas(limited))
        },
    )
}

/// Clamp the required replicas into `[min-workers, max-workers]`.
pub fn min_max() -> ResultModifier {
    ResultModifier::new(
        "min-max",
        parameters([
            (MIN_WORKERS, ParameterSpec::required(ParameterType::Int)),
            (MAX_WORKERS, ParameterSpec::required(ParameterType::Int)),
        ]),
        |workload, values, prev| {
            if prev.skip {
                return Ok(prev);
            }
            let min = int_param(values, MIN_WORKERS)?;
            let max = int_param(values, MAX_WORKERS)?;
            let required = i64::from(prev.required_replicas);
            if required > max {
                debug!(workload = %workload, required, max, "required replicas above maximum");
                Ok(ScaleResult::replicas(clamp_replicas(max)))
            } else if required < min {
                debug!(workload = %workload, required, min, "required replicas below minimum");
                Ok(ScaleResult::replicas(clamp_replicas(min)))
            } else {
                Ok(prev)
            }
        },
    )
}

/// Scale to zero, or to `min-workers`, once the queue stayed empty long
/// enough.
pub fn quick_unscale() -> ResultModifier {
    quick_unscale_with_clock(system_clock())
}

/// [`quick_unscale`] with an explicit time source.
///
/// The returned modifier remembers, per workload key, since when the queue
/// has been empty. The memory lives as long as the modifier.
pub fn quick_unscale_with_clock(clock: Clock) -> ResultModifier {
    let empty_since: Arc<Mutex<HashMap<String, u64>>> = Arc::default();
    ResultModifier::new(
        "quick-unscale",
        parameters([
            (
                SCALE_TO_ZERO_IN,
                ParameterSpec::with_default(ParameterType::Duration, Duration::ZERO),
            ),
            (
                SCALE_TO_MIN_IN,
                ParameterSpec::with_default(ParameterType::Duration, Duration::ZERO),
            ),
            (MIN_WORKERS, ParameterSpec::with_default(ParameterType::Int, -1)),
            (QUEUE_LENGTH, ParameterSpec::required(ParameterType::Int)),
        ]),
        move |workload, values, prev| {
            let queue = int_param(values, QUEUE_LENGTH)?;
            let since = {
                let mut empty_since = empty_since
                    .lock()
                    .map_err(|_| anyhow::anyhow!("quick-unscale state poisoned"))?;
                if queue > 0 {
                    empty_since.remove(&workload.key);
                    return Ok(prev);
                }
                match empty_since.get(&workload.key) {
                    Some(since) => *since,
                    None => {
                        empty_since.insert(workload.key.clone(), clock());
                        return Ok(prev);
                    }
                }
            };
            if prev.skip {
                return Ok(prev);
            }

            let empty_for = Duration::from_secs(clock().saturating_sub(since));
            let to_zero = duration_param(values, SCALE_TO_ZERO_IN)?;
            let to_min = duration_param(values, SCALE_TO_MIN_IN)?;

            if !to_zero.is_zero() && empty_for >= to_zero {
                debug!(workload = %workload, ?empty_for, ?to_zero, "queue empty, scaling to zero");
                return Ok(ScaleResult::replicas(0));
            }
            if !to_min.is_zero() && empty_for >= to_min {
                let mut min = int_param(values, MIN_WORKERS)?;
                if min < 0 {
                    warn!(workload = %workload, "scale-to-min-in set without min-workers, using 0");
                    min = 0;
                }
                if i64::from(prev.required_replicas) <= min {
                    return Ok(prev);
                }
                debug!(workload = %workload, ?empty_for, ?to_min, min, "queue empty, scaling to minimum");
                return Ok(ScaleResult::replicas(clamp_replicas(min)));
            }
            Ok(prev)
        },
    )
}

/// Skip a downscale while the queue still holds messages.
pub fn safe_unscale() -> ResultModifier {
    ResultModifier::new(
        "safe-unscale",
        parameters([
            (QUEUE_LENGTH, ParameterSpec::required(ParameterType::Int)),
            (SAFE_UNSCALE, ParameterSpec::with_default(ParameterType::Bool, true)),
        ]),
        |workload, values, prev| {
            if prev.skip || !bool_param(values, SAFE_UNSCALE)? {
                return Ok(prev);
            }
            let queue = int_param(values, QUEUE_LENGTH)?;
            if prev.required_replicas < workload.replicas && queue > 0 {
                debug!(workload = %workload, queue, "queue not empty, skipping downscale");
                return Ok(ScaleResult::skip());
            }
            Ok(prev)
        },
    )
}

/// Leave a workload alone when its replicas were manually moved outside
/// `[min-workers, max-workers]` and `override` is set.
pub fn override_limits() -> ResultModifier {
    ResultModifier::new(
        "override-limits",
        parameters([
            (OVERRIDE, ParameterSpec::with_default(ParameterType::Bool, false)),
            (MIN_WORKERS, ParameterSpec::required(ParameterType::Int)),
            (MAX_WORKERS, ParameterSpec::required(ParameterType::Int)),
        ]),
        |workload, values, prev| {
            if prev.skip || !bool_param(values, OVERRIDE)? {
                return Ok(prev);
            }
            let min = int_param(values, MIN_WORKERS)?;
            let max = int_param(values, MAX_WORKERS)?;
            let replicas = i64::from(workload.replicas);
            if replicas > max || replicas < min {
                debug!(workload = %workload, replicas, min, max, "limits overridden, skipping");
                return Ok(ScaleResult::skip());
            }
            Ok(prev)
        },
    )
}

/// Skip while the last replica change is younger than `cooldown-delay`.
pub fn cooldown_delay() -> ResultModifier {
    cooldown_delay_with_clock(system_clock())
}

/// [`cooldown_delay`] with an explicit time source.
pub fn cooldown_delay_with_clock(clock: Clock) -> ResultModifier {
    ResultModifier::new(
        "cooldown-delay",
        parameters([(
            COOLDOWN_DELAY,
            ParameterSpec::with_default(ParameterType::Duration, Duration::ZERO),
        )]),
        move |workload, values, prev| {
            if prev.skip {
                return Ok(prev);
            }
            let delay = duration_param(values, COOLDOWN_DELAY)?;
            let age = Duration::from_secs(clock().saturating_sub(workload.updated_at));
            if delay.is_zero() || age > delay {
                return Ok(prev);
            }
            debug!(workload = %workload, ?age, ?delay, "cooling down, skipping");
            Ok(ScaleResult::skip())
        },
    )
}

/// Skip while not every replica is ready.
pub fn skip_unstable() -> ResultModifier {
    ResultModifier::new("skip-unstable", Default::default(), |workload, _, prev| {
        if prev.skip || workload.is_stable() {
            return Ok(prev);
        }
        debug!(
            workload = %workload,
            replicas = workload.replicas,
            ready = workload.ready_replicas,
            "workload unstable, skipping"
        );
        Ok(ScaleResult::skip())
    })
}

/// Skip an upscale while the queue length is at or below
/// `scaling-threshold`. A negative threshold disables the check.
pub fn scaling_threshold() -> ResultModifier {
    ResultModifier::new(
        "scaling-threshold",
        parameters([
            (SCALING_THRESHOLD, ParameterSpec::with_default(ParameterType::Int, -1)),
            (QUEUE_LENGTH, ParameterSpec::required(ParameterType::Int)),
        ]),
        |workload, values, prev| {
            let threshold = int_param(values, SCALING_THRESHOLD)?;
            if threshold < 0 || prev.skip || prev.required_replicas < workload.replicas {
                return Ok(prev);
            }
            let queue = int_param(values, QUEUE_LENGTH)?;
            if queue > threshold {
                return Ok(prev);
            }
            debug!(workload = %workload, queue, threshold, "queue below threshold, skipping upscale");
            Ok(ScaleResult::skip())
        },
    )
}
