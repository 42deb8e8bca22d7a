//! Round scheduler.
//!
//! One round evaluates every workload once: selection, one provider
//! invocation per distinct provider, one forwarding task per session and
//! one merge task per workload. Each workload ends with exactly one
//! decision or one error; both output streams close when the last
//! workload is terminal.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tidescale_core::{ParameterValues, Workload};

use crate::config::AutoscalerConfig;
use crate::error::{RoundError, RoundErrorKind};
use crate::selector;
use crate::session::{self, ProvidedParameters, ProviderSession, SessionEvent, SessionReceiver};
use crate::strategy::{ScaleDecision, StrategyConfig};

/// Streams produced by one round.
pub struct RoundOutput {
    pub decisions: mpsc::UnboundedReceiver<ScaleDecision>,
    pub errors: mpsc::UnboundedReceiver<RoundError>,
    task: JoinHandle<()>,
}

impl RoundOutput {
    /// Wait for the round task itself to exit, including every provider
    /// invocation. The streams may close well before this returns.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = %e, "round task failed");
        }
    }
}

/// Everything a round produced, collected.
#[derive(Debug, Default)]
pub struct RoundReport {
    pub decisions: Vec<ScaleDecision>,
    pub errors: Vec<RoundError>,
    pub elapsed: Duration,
}

/// Drives rounds against a fixed configuration.
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: Arc<AutoscalerConfig>,
}

impl Scheduler {
    pub fn new(config: Arc<AutoscalerConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<AutoscalerConfig> {
        &self.config
    }

    /// Start a round in the background and return its output streams.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(&self, workloads: impl IntoIterator<Item = Arc<Workload>>) -> RoundOutput {
        let (decisions_tx, decisions) = mpsc::unbounded_channel();
        let (errors_tx, errors) = mpsc::unbounded_channel();
        let config = Arc::clone(&self.config);
        let workloads: Vec<_> = workloads.into_iter().collect();
        let task = tokio::spawn(run_round(config, workloads, decisions_tx, errors_tx));
        RoundOutput {
            decisions,
            errors,
            task,
        }
    }

    /// Run a round until both streams close and collect them.
    ///
    /// Returns as soon as the last workload is terminal; providers still
    /// winding down keep running in the detached round task.
    pub async fn run_round(&self, workloads: impl IntoIterator<Item = Arc<Workload>>) -> RoundReport {
        let started = Instant::now();
        let RoundOutput {
            mut decisions,
            mut errors,
            ..
        } = self.launch(workloads);

        let mut report = RoundReport::default();
        let (mut decisions_open, mut errors_open) = (true, true);
        while decisions_open || errors_open {
            tokio::select! {
                decision = decisions.recv(), if decisions_open => match decision {
                    Some(d) => report.decisions.push(d),
                    None => decisions_open = false,
                },
                err = errors.recv(), if errors_open => match err {
                    Some(e) => report.errors.push(e),
                    None => errors_open = false,
                },
            }
        }
        report.elapsed = started.elapsed();
        report
    }
}

// ── Round internals ────────────────────────────────────────────

/// A workload that passed selection and waits for its parameters.
struct PendingWorkload {
    workload: Arc<Workload>,
    strategy: Arc<StrategyConfig>,
    values: ParameterValues,
    sessions: Vec<PendingSession>,
}

struct PendingSession {
    receiver: SessionReceiver,
    parameters: Vec<String>,
}

/// What a forwarding task hands to the merge task.
enum Forwarded {
    Values(ParameterValues),
    Failed(RoundErrorKind),
}

#[derive(Clone)]
struct Outputs {
    decisions: mpsc::UnboundedSender<ScaleDecision>,
    errors: mpsc::UnboundedSender<RoundError>,
}

impl Outputs {
    fn decision(&self, decision: ScaleDecision) {
        debug!(
            workload = %decision.workload,
            strategy = %decision.strategy,
            replicas = decision.required_replicas,
            skip = decision.skip,
            "scaling decision"
        );
        let _ = self.decisions.send(decision);
    }

    fn error(&self, err: RoundError) {
        warn!(workload = %err.workload, provider = err.provider().unwrap_or("-"), "{}", err.kind);
        let _ = self.errors.send(err);
    }
}

async fn run_round(
    config: Arc<AutoscalerConfig>,
    workloads: Vec<Arc<Workload>>,
    decisions: mpsc::UnboundedSender<ScaleDecision>,
    errors: mpsc::UnboundedSender<RoundError>,
) {
    let started = Instant::now();
    let outputs = Outputs { decisions, errors };
    let total = workloads.len();
    let mut failed = 0usize;

    let mut provider_sessions: BTreeMap<String, Vec<ProviderSession>> = BTreeMap::new();
    let mut pending = Vec::with_capacity(total);

    for workload in workloads {
        let selection = match selector::select(&config, &workload) {
            Ok(selection) => selection,
            Err((strategy, e)) => {
                failed += 1;
                outputs.error(RoundError::new(workload, strategy, e.into()));
                continue;
            }
        };

        let mut sessions = Vec::with_capacity(selection.requirements.len());
        for (provider, parameters) in selection.requirements {
            let (producer, receiver) =
                session::open(Arc::clone(&workload), provider.as_str(), parameters.clone());
            provider_sessions.entry(provider).or_default().push(producer);
            sessions.push(PendingSession {
                receiver,
                parameters,
            });
        }
        pending.push(PendingWorkload {
            workload,
            strategy: selection.strategy,
            values: selection.static_values,
            sessions,
        });
    }

    let mut merges = JoinSet::new();
    for workload in pending {
        merges.spawn(evaluate_workload(workload, outputs.clone()));
    }

    let mut providers = JoinSet::new();
    for (name, sessions) in provider_sessions {
        // Selection only yields configured providers.
        let Some(provider) = config.provider(&name) else {
            continue;
        };
        debug!(provider = %name, sessions = sessions.len(), "invoking provider");
        providers.spawn(provider.provider().provide(sessions));
    }

    while let Some(joined) = merges.join_next().await {
        match joined {
            Ok(true) => {}
            Ok(false) => failed += 1,
            Err(e) => {
                failed += 1;
                error!(error = %e, "workload task failed");
            }
        }
    }

    info!(
        workloads = total,
        decided = total - failed,
        failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "round complete"
    );
    // Every workload is terminal: close both streams before waiting on providers.
    drop(outputs);

    // Sessions are all cancelled or finished; providers wind down on their own.
    while let Some(joined) = providers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "provider task failed");
        }
    }
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "providers returned");
}

/// Merge task for one workload. Returns whether a decision was emitted.
async fn evaluate_workload(pending: PendingWorkload, outputs: Outputs) -> bool {
    let PendingWorkload {
        workload,
        strategy,
        mut values,
        sessions,
    } = pending;
    let tokens: Vec<CancellationToken> = sessions.iter().map(|s| s.receiver.cancel_token()).collect();

    let outcome = if strategy.is_ready(&values) {
        Merged::Ready
    } else {
        let (tx, mut rx) = mpsc::channel(sessions.len().max(1));
        let mut forwarders = JoinSet::new();
        for session in sessions {
            forwarders.spawn(forward(
                session,
                Arc::clone(&workload),
                Arc::clone(&strategy),
                tokens.clone(),
                tx.clone(),
            ));
        }
        drop(tx);

        let outcome = loop {
            match rx.recv().await {
                Some(Forwarded::Values(batch)) => {
                    values = values.merge(&batch);
                    if strategy.is_ready(&values) {
                        break Merged::Ready;
                    }
                }
                Some(Forwarded::Failed(kind)) => break Merged::Failed(kind),
                None => break Merged::Incomplete(strategy.missing_parameters(&values)),
            }
        };

        cancel_all(&tokens);
        drop(rx);
        while let Some(joined) = forwarders.join_next().await {
            if let Err(e) = joined {
                error!(workload = %workload, error = %e, "forwarding task failed");
            }
        }
        outcome
    };
    cancel_all(&tokens);

    let kind = match outcome {
        Merged::Ready => match execute(&strategy, &workload, &values) {
            Ok(decision) => {
                outputs.decision(decision);
                return true;
            }
            Err(kind) => kind,
        },
        Merged::Failed(kind) => kind,
        Merged::Incomplete(missing) => RoundErrorKind::IncompleteParameters { missing },
    };
    outputs.error(RoundError::new(
        workload,
        Some(strategy.name().to_string()),
        kind,
    ));
    false
}

enum Merged {
    Ready,
    Failed(RoundErrorKind),
    Incomplete(Vec<String>),
}

/// Drain one session into the workload's merge task.
async fn forward(
    mut session: PendingSession,
    workload: Arc<Workload>,
    strategy: Arc<StrategyConfig>,
    siblings: Vec<CancellationToken>,
    tx: mpsc::Sender<Forwarded>,
) {
    let provider = session.receiver.provider().to_string();
    while let Some(event) = session.receiver.next_result().await {
        let forwarded = match event {
            SessionEvent::Values(batch) => {
                match typed_batch(&workload, &strategy, &provider, &session.parameters, batch) {
                    Ok(values) => Forwarded::Values(values),
                    Err(kind) => Forwarded::Failed(kind),
                }
            }
            SessionEvent::Error(cause) => Forwarded::Failed(RoundErrorKind::Provider {
                provider: provider.clone(),
                cause,
            }),
        };

        let failed = matches!(forwarded, Forwarded::Failed(_));
        if failed {
            cancel_all(&siblings);
        }
        if tx.send(forwarded).await.is_err() || failed {
            break;
        }
    }
}

/// Check a raw batch against the strategy's declared types.
///
/// Names the session did not request are dropped.
fn typed_batch(
    workload: &Workload,
    strategy: &StrategyConfig,
    provider: &str,
    requested: &[String],
    batch: ProvidedParameters,
) -> Result<ParameterValues, RoundErrorKind> {
    let mut values = ParameterValues::new();
    for (name, value) in batch {
        let spec = match strategy.required_parameters().get(&name) {
            Some(spec) if requested.contains(&name) => spec,
            _ => {
                warn!(workload = %workload, provider, parameter = %name, "dropping unrequested value");
                continue;
            }
        };
        values
            .insert(name.clone(), value, spec.ty)
            .map_err(|source| RoundErrorKind::Conversion {
                provider: provider.to_string(),
                parameter: name,
                source,
            })?;
    }
    Ok(values)
}

fn execute(
    strategy: &StrategyConfig,
    workload: &Arc<Workload>,
    values: &ParameterValues,
) -> Result<ScaleDecision, RoundErrorKind> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| strategy.execute(workload, values))) {
        Ok(Ok(decision)) => Ok(decision),
        Ok(Err(cause)) => Err(RoundErrorKind::Strategy { cause }),
        Err(panic) => Err(RoundErrorKind::Strategy {
            cause: anyhow::anyhow!("strategy panicked: {}", panic_message(panic.as_ref())),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

fn cancel_all(tokens: &[CancellationToken]) {
    for token in tokens {
        token.cancel();
    }
}
