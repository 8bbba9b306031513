//! End-to-end tests for the automation engine: experiment lifecycle,
//! traffic assignment, analysis, automated decisions, and notifications.

use std::collections::HashMap;
use std::sync::Arc;

use ab_automation_config::{AnomalyAction, EngineConfig, ReportingFrequency};
use ab_automation_engine::{ABTestEngine, DecisionPolicy, MemorySink, NullMetricsSource};
use ab_automation_types::{
    Decision, Experiment, ExperimentDefinition, ExperimentStatus, NotificationEvent, Variant,
};
use uuid::Uuid;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();

    config.automation.enable_automatic_decisions = true;
    config.automation.minimum_sample_size = 100;
    config.automation.enable_safety_checks = false;
    config.automation.anomaly_action = AnomalyAction::Pause;

    // checks due immediately so tests drive them synchronously
    config.scheduler.statistical_check_hours = 0;
    config.scheduler.performance_check_hours = 0;
    config.scheduler.anomaly_check_hours = 0;
    config.scheduler.tick_interval_secs = 1;

    config.notifications.enable_notifications = true;
    config.notifications.enable_automatic_reporting = true;
    config.notifications.reporting_frequency = ReportingFrequency::ExperimentCompletion;

    config
}

fn engine_with_sink(config: EngineConfig) -> (ABTestEngine, Arc<MemorySink>) {
    init_tracing();
    let sink = Arc::new(MemorySink::new());
    let engine = ABTestEngine::with_sinks(
        config,
        Arc::new(NullMetricsSource),
        sink.clone(),
        sink.clone(),
    )
    .expect("engine");
    (engine, sink)
}

fn two_variant_definition(weights: (f64, f64)) -> ExperimentDefinition {
    ExperimentDefinition::new(
        "Landing page CTA test",
        vec![
            Variant::new("control", weights.0, true),
            Variant::new("variant_a", weights.1, false),
        ],
    )
}

fn arm_ids(experiment: &Experiment) -> (Uuid, Uuid) {
    let control = experiment.control().expect("control").id;
    let treatment = experiment
        .variants
        .iter()
        .find(|v| !v.is_control)
        .expect("treatment")
        .id;
    (control, treatment)
}

/// Assign participants through the engine and convert each arm's users at
/// the given per-mille rates.
fn populate(engine: &ABTestEngine, experiment_id: &Uuid, users: u64, rates: HashMap<Uuid, u64>) {
    let mut counts: HashMap<Uuid, u64> = HashMap::new();
    for i in 0..users {
        let user = format!("user-{i}");
        if let Some(variant_id) = engine.assign_variant(experiment_id, &user).expect("assign") {
            let count = counts.entry(variant_id).or_default();
            let rate = rates.get(&variant_id).copied().unwrap_or(0);
            if *count % 1000 < rate {
                engine
                    .record_conversion(experiment_id, &user, "inquiry_submission", None)
                    .expect("record");
            }
            *count += 1;
        }
    }
}

#[tokio::test]
async fn test_winner_is_implemented_end_to_end() {
    let (engine, sink) = engine_with_sink(test_config());

    let experiment = engine
        .create_experiment(two_variant_definition((50.0, 50.0)))
        .expect("create");
    engine.start_experiment(&experiment.id).expect("start");

    let (control_id, treatment_id) = arm_ids(&experiment);

    // control converts at 5%, treatment at 12%: significant, with an
    // effect size below the manual-approval threshold
    populate(
        &engine,
        &experiment.id,
        2000,
        HashMap::from([(control_id, 50), (treatment_id, 120)]),
    );

    let analysis = engine.get_analysis(&experiment.id).expect("analysis");
    assert_eq!(analysis.winner, Some(treatment_id));
    assert!(analysis.overall_significance.is_significant);

    engine.run_pending_checks().await;

    let stopped = engine.get_experiment(&experiment.id).expect("get");
    assert_eq!(stopped.status, ExperimentStatus::Completed);
    assert!(stopped.end_date.is_some());

    let history = engine.get_decision_history(&experiment.id);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].decision, Decision::ImplementWinner);
    assert!(history[0].confidence > 0.95);

    // completion removed the experiment's checks
    assert!(engine.scheduled_checks(&experiment.id).is_empty());

    engine.shutdown().await;

    let events: Vec<_> = sink.notifications().iter().map(|n| n.event).collect();
    assert!(events.contains(&NotificationEvent::ExperimentStarted));
    assert!(events.contains(&NotificationEvent::ExperimentCompleted));
    assert!(events.contains(&NotificationEvent::AutomatedDecision));

    // final report dispatched on completion
    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].summary.winning_variant, Some(treatment_id));
    assert_eq!(reports[0].decision.decision, Decision::ImplementWinner);
}

#[tokio::test]
async fn test_assignment_determinism_through_facade() {
    let (engine, _sink) = engine_with_sink(test_config());

    let experiment = engine
        .create_experiment(two_variant_definition((50.0, 50.0)).with_traffic_allocation(40.0))
        .expect("create");
    engine.start_experiment(&experiment.id).expect("start");

    for i in 0..100 {
        let user = format!("visitor-{i}");
        let first = engine.assign_variant(&experiment.id, &user).expect("assign");
        for _ in 0..5 {
            assert_eq!(
                engine.assign_variant(&experiment.id, &user).expect("assign"),
                first
            );
        }
    }
}

#[tokio::test]
async fn test_no_assignment_outside_running() {
    let (engine, _sink) = engine_with_sink(test_config());

    let experiment = engine
        .create_experiment(two_variant_definition((50.0, 50.0)))
        .expect("create");

    assert_eq!(
        engine.assign_variant(&experiment.id, "early-bird").expect("assign"),
        None
    );

    engine.start_experiment(&experiment.id).expect("start");
    assert!(engine
        .assign_variant(&experiment.id, "early-bird")
        .expect("assign")
        .is_some());

    engine.pause_experiment(&experiment.id).expect("pause");
    assert_eq!(
        engine.assign_variant(&experiment.id, "early-bird").expect("assign"),
        None
    );

    engine.start_experiment(&experiment.id).expect("resume");
    engine.stop_experiment(&experiment.id).expect("stop");
    assert_eq!(
        engine.assign_variant(&experiment.id, "early-bird").expect("assign"),
        None
    );
}

#[tokio::test]
async fn test_insufficient_data_yields_continue() {
    let (engine, _sink) = engine_with_sink(test_config());

    let experiment = engine
        .create_experiment(two_variant_definition((50.0, 50.0)))
        .expect("create");
    engine.start_experiment(&experiment.id).expect("start");

    // dashboards polling a brand-new experiment get a valid analysis
    let analysis = engine.get_analysis(&experiment.id).expect("analysis");
    assert_eq!(analysis.total_participants, 0);
    assert!(analysis.winner.is_none());
    assert!(!analysis.overall_significance.is_significant);

    // and the policy, fed that analysis, keeps the experiment running
    let config = test_config();
    let snapshot = engine.get_experiment(&experiment.id).expect("get");
    let decision = DecisionPolicy::decide(
        &snapshot,
        &analysis,
        &config.automation,
        chrono::Utc::now(),
    );
    assert_eq!(decision.decision, Decision::Continue);

    // the scheduler itself holds off below the minimum requirements
    engine.run_pending_checks().await;
    assert!(engine.get_decision_history(&experiment.id).is_empty());
}

#[tokio::test]
async fn test_idempotent_start_produces_no_duplicate_checks() {
    let (engine, _sink) = engine_with_sink(test_config());

    let experiment = engine
        .create_experiment(two_variant_definition((50.0, 50.0)))
        .expect("create");

    engine.start_experiment(&experiment.id).expect("start");
    let first = engine.scheduled_checks(&experiment.id);

    engine.start_experiment(&experiment.id).expect("start again");
    engine.start_experiment(&experiment.id).expect("start again");
    let after = engine.scheduled_checks(&experiment.id);

    assert_eq!(first.len(), after.len());
    assert_eq!(first.len(), 3);
}

#[tokio::test]
async fn test_pause_removes_and_resume_restores_checks() {
    let (engine, _sink) = engine_with_sink(test_config());

    let experiment = engine
        .create_experiment(two_variant_definition((50.0, 50.0)))
        .expect("create");

    engine.start_experiment(&experiment.id).expect("start");
    assert!(!engine.scheduled_checks(&experiment.id).is_empty());

    engine.pause_experiment(&experiment.id).expect("pause");
    assert!(engine.scheduled_checks(&experiment.id).is_empty());

    engine.start_experiment(&experiment.id).expect("resume");
    assert_eq!(engine.scheduled_checks(&experiment.id).len(), 3);
}

#[tokio::test]
async fn test_anomalous_traffic_pauses_experiment() {
    let (engine, sink) = engine_with_sink(test_config());

    // 95/5 weights: actual traffic split far from the expected even split
    let experiment = engine
        .create_experiment(two_variant_definition((95.0, 5.0)))
        .expect("create");
    engine.start_experiment(&experiment.id).expect("start");

    let (control_id, treatment_id) = arm_ids(&experiment);
    populate(
        &engine,
        &experiment.id,
        2000,
        HashMap::from([(control_id, 50), (treatment_id, 50)]),
    );

    let analysis = engine.get_analysis(&experiment.id).expect("analysis");
    assert!(analysis
        .anomalies
        .iter()
        .any(|a| a.kind == ab_automation_types::AnomalyKind::SampleRatioMismatch));

    engine.run_pending_checks().await;

    assert_eq!(
        engine.get_experiment(&experiment.id).expect("get").status,
        ExperimentStatus::Paused
    );

    let history = engine.get_decision_history(&experiment.id);
    assert!(history.iter().any(|d| d.decision == Decision::Pause));

    engine.shutdown().await;
    assert!(sink
        .notifications()
        .iter()
        .any(|n| n.event == NotificationEvent::AutomatedDecision));
}

#[tokio::test]
async fn test_executive_summary_polling() {
    let (engine, _sink) = engine_with_sink(test_config());

    let experiment = engine
        .create_experiment(two_variant_definition((50.0, 50.0)))
        .expect("create");
    engine.start_experiment(&experiment.id).expect("start");

    let (control_id, treatment_id) = arm_ids(&experiment);
    populate(
        &engine,
        &experiment.id,
        2000,
        HashMap::from([(control_id, 50), (treatment_id, 120)]),
    );

    let summary = engine
        .get_executive_summary(&experiment.id)
        .expect("summary");

    assert_eq!(summary.experiment_name, "Landing page CTA test");
    assert_eq!(summary.winning_variant, Some(treatment_id));
    assert!(summary.improvement_rate_pct > 0.0);
    assert!(summary.total_participants > 0);
}

#[tokio::test]
async fn test_weight_conservation_enforced() {
    let (engine, _sink) = engine_with_sink(test_config());

    let bad = ExperimentDefinition::new(
        "Broken",
        vec![
            Variant::new("control", 40.0, true),
            Variant::new("variant_a", 40.0, false),
        ],
    );

    assert!(engine.create_experiment(bad).is_err());
    assert!(engine.list_experiments().is_empty());
}

#[tokio::test]
async fn test_required_sample_size_from_config() {
    let (engine, _sink) = engine_with_sink(test_config());

    // defaults: 5% MDE, 80% power, alpha 0.05
    let n = engine.required_sample_size(0.1).expect("sample size");
    assert!(n > 10_000, "small relative effects need large samples, got {n}");

    assert!(engine.required_sample_size(0.0).is_err());
}

#[tokio::test]
async fn test_background_driver_lifecycle() {
    let (engine, _sink) = engine_with_sink(test_config());

    engine.start_automation();
    // second call is a no-op
    engine.start_automation();

    let experiment = engine
        .create_experiment(two_variant_definition((50.0, 50.0)))
        .expect("create");
    engine.start_experiment(&experiment.id).expect("start");

    engine.shutdown().await;
    // shutdown is idempotent
    engine.shutdown().await;
}
