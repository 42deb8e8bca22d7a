//! Round loop over the in-memory workload inventory.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use tidescale_core::{epoch_secs, DaemonConfig, Workload};
use tidescale_engine::{AutoscalerConfig, RoundReport, ScaleDecision, Scheduler};
use tidescale_providers::configured_providers;
use tidescale_strategies::builtin_strategies;

/// Assemble the engine configuration described by the daemon file.
pub fn engine_config(config: &DaemonConfig) -> anyhow::Result<AutoscalerConfig> {
    let mut engine = AutoscalerConfig::new()
        .with_annotation_prefix(config.annotation_prefix.clone())
        .with_strategies(builtin_strategies());
    for provider in configured_providers(config)? {
        engine = engine.with_provider(provider);
    }
    if let Some(strategy) = &config.default_strategy {
        engine = engine.with_default_strategy(strategy.clone());
    }
    for (parameter, provider) in &config.default_providers {
        engine = engine.with_default_provider(parameter.clone(), provider.clone());
    }
    Ok(engine)
}

/// Log every configuration error and fail if there was any.
pub fn ensure_valid(engine: &AutoscalerConfig) -> anyhow::Result<()> {
    let errors = engine.validate();
    for e in &errors {
        error!(error = %e, "invalid configuration");
    }
    anyhow::ensure!(errors.is_empty(), "{} configuration error(s)", errors.len());
    Ok(())
}

/// JSON view of a decision, one object per line in `--once` output.
pub fn decision_json(decision: &ScaleDecision) -> serde_json::Value {
    serde_json::json!({
        "workload": decision.workload.key,
        "name": decision.workload.name,
        "strategy": decision.strategy,
        "current_replicas": decision.workload.replicas,
        "required_replicas": decision.required_replicas,
        "skip": decision.skip,
    })
}

pub struct Daemon {
    scheduler: Scheduler,
    inventory: Vec<Workload>,
    interval: Duration,
}

impl Daemon {
    pub fn new(config: &DaemonConfig) -> anyhow::Result<Self> {
        let engine = engine_config(config)?;
        Self::from_parts(engine, config.workloads.clone(), config.interval()?)
    }

    pub fn from_parts(
        engine: AutoscalerConfig,
        inventory: Vec<Workload>,
        interval: Duration,
    ) -> anyhow::Result<Self> {
        ensure_valid(&engine)?;
        Ok(Self {
            scheduler: Scheduler::new(Arc::new(engine)),
            inventory,
            interval,
        })
    }

    pub fn inventory(&self) -> &[Workload] {
        &self.inventory
    }

    /// Evaluate every workload once and apply the decisions.
    pub async fn round(&mut self) -> RoundReport {
        let workloads: Vec<_> = self.inventory.iter().cloned().map(Arc::new).collect();
        let report = self.scheduler.run_round(workloads).await;
        let changed = self.apply(&report.decisions);
        info!(
            decisions = report.decisions.len(),
            errors = report.errors.len(),
            changed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "round applied"
        );
        report
    }

    /// Write non-skipped decisions back to the inventory.
    ///
    /// Returns how many workloads changed replica count.
    pub fn apply(&mut self, decisions: &[ScaleDecision]) -> usize {
        let now = epoch_secs();
        let mut changed = 0;
        for decision in decisions.iter().filter(|d| !d.skip) {
            let Some(workload) = self
                .inventory
                .iter_mut()
                .find(|w| w.key == decision.workload.key)
            else {
                continue;
            };
            if workload.replicas == decision.required_replicas {
                continue;
            }
            info!(
                workload = %workload.key,
                from = workload.replicas,
                to = decision.required_replicas,
                strategy = %decision.strategy,
                "scaling workload"
            );
            // No real rollout behind the inventory: new replicas are ready at once.
            workload.replicas = decision.required_replicas;
            workload.ready_replicas = decision.required_replicas;
            workload.updated_at = now;
            changed += 1;
        }
        changed
    }

    /// Run rounds on the configured interval until `shutdown` flips.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            workloads = self.inventory.len(),
            "tidescaled started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.round().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("tidescaled shutting down");
                        break;
                    }
                }
            }
        }
    }
}
