//! Whole-round scenarios run through the public scheduler API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use tidescale_core::{ParameterType, ParameterValue, Workload};
use tidescale_engine::{
    clamp_replicas, parameters, provider_fn, AutoscalerConfig, ParameterSpec, ProviderConfig,
    ProviderSession, ResultModifier, RoundErrorKind, ScaleResult, Scheduler, StrategyConfig,
};

// ── Fixtures ───────────────────────────────────────────────────

fn queue_strategy() -> StrategyConfig {
    StrategyConfig::new(
        "queue",
        parameters([
            ("queue-length", ParameterSpec::required(ParameterType::Int)),
            ("messages-per-worker", ParameterSpec::with_default(ParameterType::Int, 1)),
            ("offset", ParameterSpec::with_default(ParameterType::Int, 2)),
        ]),
        |_, values| {
            let queue = values.int("queue-length").unwrap_or_default();
            let per_worker = values.int("messages-per-worker").unwrap_or(1).max(1);
            let offset = values.int("offset").unwrap_or_default();
            Ok(ScaleResult::replicas(clamp_replicas(
                (queue as f64 / per_worker as f64).ceil() as i64 + offset,
            )))
        },
    )
}

fn min_max() -> ResultModifier {
    ResultModifier::new(
        "min-max",
        parameters([
            ("min", ParameterSpec::required(ParameterType::Int)),
            ("max", ParameterSpec::required(ParameterType::Int)),
        ]),
        |_, values, prev| {
            if prev.skip {
                return Ok(prev);
            }
            let min = clamp_replicas(values.int("min").unwrap_or_default());
            let max = clamp_replicas(values.int("max").unwrap_or(i64::MAX));
            Ok(ScaleResult::replicas(prev.required_replicas.clamp(min, max)))
        },
    )
}

/// Provider answering every session with the same fixed batch.
fn fixed_provider(name: &str, values: Vec<(&str, ParameterValue)>) -> ProviderConfig {
    let batch: HashMap<String, ParameterValue> = values
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    let mut config = ProviderConfig::new(
        name,
        provider_fn({
            let batch = batch.clone();
            move |sessions: Vec<ProviderSession>| {
                let batch = batch.clone();
                async move {
                    for s in sessions {
                        s.put_result(batch.clone()).await;
                        s.finish();
                    }
                }
            }
        }),
    );
    for (name, value) in &batch {
        config = config.with_parameter(name.clone(), value.kind());
    }
    config
}

fn queue_workload(key: &str, provider: &str) -> Arc<Workload> {
    Arc::new(
        Workload::new(key, key)
            .with_annotation("tidescale/strategy", "queue")
            .with_annotation("tidescale/queue-length", provider)
            .with_replicas(1, 1),
    )
}

// ── Scenarios ──────────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_single_workload() {
    let config = AutoscalerConfig::new()
        .with_strategy(queue_strategy())
        .with_provider(fixed_provider("rmq", vec![("queue-length", ParameterValue::Int(100))]));
    let scheduler = Scheduler::new(Arc::new(config));

    let report = scheduler.run_round([queue_workload("default/w", "rmq")]).await;

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.decisions.len(), 1);
    let decision = &report.decisions[0];
    assert_eq!(decision.workload.key, "default/w");
    assert_eq!(decision.required_replicas, 102);
    assert!(!decision.skip);
}

#[tokio::test]
async fn modifier_clamps_result() {
    let config = AutoscalerConfig::new()
        .with_strategy(queue_strategy().with_modifier(min_max()))
        .with_provider(fixed_provider("rmq", vec![("queue-length", ParameterValue::Int(100))]));
    let workload = Workload::clone(&queue_workload("default/w", "rmq"))
        .with_annotation("tidescale/min", "1")
        .with_annotation("tidescale/max", "50");

    let report = Scheduler::new(Arc::new(config))
        .run_round([Arc::new(workload)])
        .await;

    assert_eq!(report.decisions.len(), 1);
    assert_eq!(report.decisions[0].required_replicas, 50);
}

#[tokio::test]
async fn provider_error_cancels_sibling_session() {
    let (report_tx, mut report_rx) = mpsc::unbounded_channel();

    let failing = ProviderConfig::new(
        "failing",
        provider_fn(|sessions: Vec<ProviderSession>| async move {
            for s in sessions {
                s.error(anyhow::anyhow!("broker unreachable")).await;
                s.finish();
            }
        }),
    )
    .with_parameter("queue-length", ParameterType::Int);

    let slow = ProviderConfig::new(
        "slow",
        provider_fn(move |sessions: Vec<ProviderSession>| {
            let report_tx = report_tx.clone();
            async move {
                for s in sessions {
                    s.cancelled().await;
                    let batch = HashMap::from([("min".to_string(), ParameterValue::Int(1))]);
                    let put = s.put_result(batch).await;
                    let err = s.error(anyhow::anyhow!("too late")).await;
                    let _ = report_tx.send((s.is_cancelled(), put, err));
                    s.finish();
                }
            }
        }),
    )
    .with_parameter("min", ParameterType::Int);

    let config = AutoscalerConfig::new()
        .with_strategy(queue_strategy().with_modifier(min_max()))
        .with_provider(failing)
        .with_provider(slow);
    let workload = Workload::clone(&queue_workload("default/w", "failing"))
        .with_annotation("tidescale/min", "slow")
        .with_annotation("tidescale/max", "10");

    let report = Scheduler::new(Arc::new(config))
        .run_round([Arc::new(workload)])
        .await;

    assert!(report.decisions.is_empty());
    assert_eq!(report.errors.len(), 1);
    let err = &report.errors[0];
    assert_eq!(err.provider(), Some("failing"));
    assert_eq!(err.strategy.as_deref(), Some("queue"));
    assert!(
        matches!(err.kind, RoundErrorKind::Provider { .. }),
        "expected provider error, got {:?}",
        err.kind
    );

    let (cancelled, put, errored) = report_rx.recv().await.unwrap();
    assert!(cancelled);
    assert!(!put, "put_result after cancel must be a no-op");
    assert!(!errored, "error after cancel must be a no-op");
}

#[tokio::test]
async fn outputs_close_once_for_many_workloads() {
    const WORKLOADS: usize = 24;

    fn delayed(name: &'static str, parameter: &'static str) -> ProviderConfig {
        ProviderConfig::new(
            name,
            provider_fn(move |sessions: Vec<ProviderSession>| async move {
                let mut tasks = tokio::task::JoinSet::new();
                for (i, s) in sessions.into_iter().enumerate() {
                    tasks.spawn(async move {
                        tokio::time::sleep(Duration::from_millis((i % 5) as u64)).await;
                        if i % 7 == 3 {
                            s.error(anyhow::anyhow!("flaky")).await;
                        } else {
                            let batch = HashMap::from([(parameter.to_string(), ParameterValue::Int(5))]);
                            s.put_result(batch).await;
                        }
                        s.finish();
                    });
                }
                while tasks.join_next().await.is_some() {}
            }),
        )
        .with_parameter(parameter, ParameterType::Int)
    }

    let config = AutoscalerConfig::new()
        .with_strategy(queue_strategy().with_modifier(min_max()))
        .with_provider(delayed("queue", "queue-length"))
        .with_provider(delayed("lower", "min"))
        .with_provider(delayed("upper", "max"))
        .with_default_provider("queue-length", "queue")
        .with_default_provider("min", "lower")
        .with_default_provider("max", "upper")
        .with_default_strategy("queue");
    let workloads: Vec<_> = (0..WORKLOADS)
        .map(|i| Arc::new(Workload::new(format!("ns/w{i}"), format!("w{i}"))))
        .collect();

    let mut output = Scheduler::new(Arc::new(config)).launch(workloads);

    let mut decisions = 0;
    while let Some(d) = output.decisions.recv().await {
        assert_eq!(d.required_replicas, 5);
        decisions += 1;
    }
    let mut errors = 0;
    while let Some(e) = output.errors.recv().await {
        assert!(matches!(e.kind, RoundErrorKind::Provider { .. }));
        errors += 1;
    }
    assert_eq!(decisions + errors, WORKLOADS);
    assert!(errors > 0);

    // Closed streams stay closed.
    assert!(output.decisions.recv().await.is_none());
    assert!(output.errors.recv().await.is_none());
    output.join().await;
}

/// Provider that delivers its batch, then lingers before finishing.
fn lingering_provider(linger: Duration, finished: Arc<AtomicUsize>) -> ProviderConfig {
    ProviderConfig::new(
        "lingering",
        provider_fn(move |sessions: Vec<ProviderSession>| {
            let finished = Arc::clone(&finished);
            async move {
                for s in &sessions {
                    let batch = HashMap::from([("queue-length".to_string(), ParameterValue::Int(1))]);
                    s.put_result(batch).await;
                }
                tokio::time::sleep(linger).await;
                for s in sessions {
                    s.finish();
                }
                finished.fetch_add(1, Ordering::SeqCst);
            }
        }),
    )
    .with_parameter("queue-length", ParameterType::Int)
}

#[tokio::test]
async fn round_ends_when_last_workload_is_terminal() {
    let finished = Arc::new(AtomicUsize::new(0));
    let config = AutoscalerConfig::new()
        .with_strategy(queue_strategy())
        .with_provider(lingering_provider(Duration::from_secs(30), Arc::clone(&finished)));

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        Scheduler::new(Arc::new(config)).run_round([queue_workload("default/w", "lingering")]),
    )
    .await
    .expect("round outlived its only workload");

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.decisions.len(), 1);
    assert_eq!(report.decisions[0].required_replicas, 3);
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn streams_close_before_providers_return() {
    let finished = Arc::new(AtomicUsize::new(0));
    let config = AutoscalerConfig::new()
        .with_strategy(queue_strategy())
        .with_provider(lingering_provider(Duration::from_millis(300), Arc::clone(&finished)));

    let mut output = Scheduler::new(Arc::new(config)).launch([queue_workload("default/w", "lingering")]);

    let decision = output.decisions.recv().await.unwrap();
    assert_eq!(decision.required_replicas, 3);
    let closed = tokio::time::timeout(Duration::from_millis(200), async {
        (output.decisions.recv().await, output.errors.recv().await)
    })
    .await
    .expect("streams stayed open while the provider lingered");
    assert!(closed.0.is_none() && closed.1.is_none());
    assert_eq!(finished.load(Ordering::SeqCst), 0);

    // Joining the round waits for the provider as well.
    output.join().await;
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sessions_closing_early_report_missing_parameters() {
    let silent = ProviderConfig::new(
        "silent",
        provider_fn(|sessions: Vec<ProviderSession>| async move {
            sessions.into_iter().for_each(ProviderSession::finish);
        }),
    )
    .with_parameter("queue-length", ParameterType::Int)
    .with_parameter("max", ParameterType::Int);

    let config = AutoscalerConfig::new()
        .with_strategy(queue_strategy().with_modifier(min_max()))
        .with_provider(silent);
    let workload = Workload::clone(&queue_workload("default/w", "silent"))
        .with_annotation("tidescale/min", "0")
        .with_annotation("tidescale/max", "silent");

    let report = Scheduler::new(Arc::new(config))
        .run_round([Arc::new(workload)])
        .await;

    assert_eq!(report.errors.len(), 1);
    match &report.errors[0].kind {
        RoundErrorKind::IncompleteParameters { missing } => {
            assert_eq!(missing, &["max", "queue-length"]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn selection_error_isolated_from_other_workloads() {
    let config = AutoscalerConfig::new()
        .with_strategy(queue_strategy())
        .with_provider(fixed_provider("rmq", vec![("queue-length", ParameterValue::Int(3))]));
    let lost = Arc::new(
        Workload::new("default/lost", "lost").with_annotation("tidescale/strategy", "nope"),
    );

    let report = Scheduler::new(Arc::new(config))
        .run_round([lost, queue_workload("default/ok", "rmq")])
        .await;

    assert_eq!(report.decisions.len(), 1);
    assert_eq!(report.decisions[0].required_replicas, 5);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].workload.key, "default/lost");
    assert!(report.errors[0].strategy.is_none());
    assert!(matches!(report.errors[0].kind, RoundErrorKind::Selection(_)));
}

#[tokio::test]
async fn provider_value_of_wrong_kind_is_a_conversion_error() {
    let config = AutoscalerConfig::new()
        .with_strategy(queue_strategy())
        .with_provider(
            fixed_provider("rmq", vec![("queue-length", ParameterValue::String("lots".into()))])
                .with_parameter("queue-length", ParameterType::Int),
        );

    let report = Scheduler::new(Arc::new(config))
        .run_round([queue_workload("default/w", "rmq")])
        .await;

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].provider(), Some("rmq"));
    assert!(matches!(
        report.errors[0].kind,
        RoundErrorKind::Conversion { ref parameter, .. } if parameter == "queue-length"
    ));
}

#[tokio::test]
async fn static_only_workload_never_contacts_providers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counting = ProviderConfig::new(
        "rmq",
        provider_fn({
            let calls = Arc::clone(&calls);
            move |sessions: Vec<ProviderSession>| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { sessions.into_iter().for_each(ProviderSession::finish) }
            }
        }),
    )
    .with_parameter("queue-length", ParameterType::Int);

    let config = AutoscalerConfig::new()
        .with_strategy(queue_strategy())
        .with_provider(counting);
    let report = Scheduler::new(Arc::new(config))
        .run_round([queue_workload("default/w", "40")])
        .await;

    assert_eq!(report.decisions.len(), 1);
    assert_eq!(report.decisions[0].required_replicas, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unrequested_values_are_ignored() {
    let config = AutoscalerConfig::new()
        .with_strategy(queue_strategy())
        .with_provider(fixed_provider(
            "rmq",
            vec![
                ("queue-length", ParameterValue::Int(10)),
                ("offset", ParameterValue::Int(1000)),
            ],
        ));

    let report = Scheduler::new(Arc::new(config))
        .run_round([queue_workload("default/w", "rmq")])
        .await;

    assert_eq!(report.decisions.len(), 1);
    assert_eq!(report.decisions[0].required_replicas, 12);
}

#[tokio::test]
async fn strategy_failure_is_reported() {
    let failing = StrategyConfig::new(
        "queue",
        parameters([("queue-length", ParameterSpec::required(ParameterType::Int))]),
        |_, _| anyhow::bail!("division by zero"),
    );
    let config = AutoscalerConfig::new()
        .with_strategy(failing)
        .with_provider(fixed_provider("rmq", vec![("queue-length", ParameterValue::Int(1))]));

    let report = Scheduler::new(Arc::new(config))
        .run_round([queue_workload("default/w", "rmq")])
        .await;

    assert_eq!(report.errors.len(), 1);
    assert_eq!(
        report.errors[0].to_string(),
        "failed to get scaling result for default/w: strategy failed: division by zero"
    );
}
