//! Parameter names shared by the built-in strategy and its modifiers.

pub const QUEUE_LENGTH: &str = "queue-length";
pub const MESSAGES_PER_WORKER: &str = "messages-per-worker";
pub const OFFSET: &str = "offset";
pub const STEPS: &str = "steps";
pub const COOLDOWN_DELAY: &str = "cooldown-delay";
pub const MIN_WORKERS: &str = "min-workers";
pub const MAX_WORKERS: &str = "max-workers";
pub const OVERRIDE: &str = "override";
pub const SAFE_UNSCALE: &str = "safe-unscale";
pub const SCALE_TO_ZERO_IN: &str = "scale-to-zero-in";
pub const SCALE_TO_MIN_IN: &str = "scale-to-min-in";
pub const SCALING_THRESHOLD: &str = "scaling-threshold";
