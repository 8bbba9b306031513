//! Automation scheduler
//!
//! A single background driver wakes on a fixed tick and fans out the due
//! checks. Checks for different experiments run concurrently; checks for
//! the same experiment run serially within one task, and an experiment
//! whose checks are still in flight is skipped on the next tick rather
//! than raced. A failing check is isolated at the per-check boundary:
//! logged, surfaced as an operational alert, and never allowed to halt
//! sibling checks or corrupt the schedule.

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::AnalysisEngine;
use crate::errors::{EngineError, Result};
use crate::notify::Notifier;
use crate::policy::DecisionPolicy;
use crate::store::ExperimentStore;
use ab_automation_config::{AnomalyAction, AutomationConfig, SchedulerConfig};
use ab_automation_types::{
    AnomalyKind, AutomatedDecision, CheckType, Decision, Experiment, ExperimentStatus, FinalReport,
    Notification, NotificationEvent, ScheduledCheck,
};

/// Background scheduler that owns per-experiment check lists and the
/// append-only decision history.
pub struct AutomationScheduler {
    inner: Arc<SchedulerInner>,
    shutdown_tx: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

struct SchedulerInner {
    store: Arc<ExperimentStore>,
    analysis: Arc<AnalysisEngine>,
    notifier: Arc<Notifier>,
    automation: AutomationConfig,
    scheduler: SchedulerConfig,
    reporting_enabled: bool,
    /// Pending checks per experiment; removed when the experiment leaves
    /// `Running`
    checks: DashMap<Uuid, Vec<ScheduledCheck>>,
    /// Append-only decision log per experiment, in execution order
    history: DashMap<Uuid, Vec<AutomatedDecision>>,
    /// Experiments with a check task currently executing
    in_flight: DashMap<Uuid, ()>,
}

impl AutomationScheduler {
    pub fn new(
        store: Arc<ExperimentStore>,
        analysis: Arc<AnalysisEngine>,
        notifier: Arc<Notifier>,
        automation: AutomationConfig,
        scheduler: SchedulerConfig,
        reporting_enabled: bool,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                analysis,
                notifier,
                automation,
                scheduler,
                reporting_enabled,
                checks: DashMap::new(),
                history: DashMap::new(),
                in_flight: DashMap::new(),
            }),
            shutdown_tx,
            driver: Mutex::new(None),
        }
    }

    /// Spawn the background driver. Must be called from a runtime context;
    /// calling twice is a no-op.
    pub fn start(&self) {
        let mut driver = self.driver.lock().expect("lock");
        if driver.is_some() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let tick = Duration::from_secs(self.inner.scheduler.tick_interval_secs);

        *driver = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!("automation scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // handles are detached; the in-flight guard keeps
                        // overlapping ticks from racing the same experiment
                        let _ = inner.tick();
                    }
                    _ = shutdown_rx.changed() => {
                        info!("automation scheduler stopping");
                        break;
                    }
                }
            }
        }));
    }

    /// Register periodic checks for a running experiment. Idempotent: an
    /// experiment that is already watched keeps its existing schedule, so
    /// repeated starts never produce duplicate checks.
    pub fn watch(&self, experiment: &Experiment) {
        self.inner.register_checks(experiment);
    }

    /// Deterministically remove an experiment's future checks.
    pub fn unwatch(&self, experiment_id: &Uuid) {
        if self.inner.checks.remove(experiment_id).is_some() {
            debug!(experiment_id = %experiment_id, "removed scheduled checks");
        }
    }

    pub fn scheduled_checks(&self, experiment_id: &Uuid) -> Vec<ScheduledCheck> {
        self.inner
            .checks
            .get(experiment_id)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn decision_history(&self, experiment_id: &Uuid) -> Vec<AutomatedDecision> {
        self.inner
            .history
            .get(experiment_id)
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// Run one tick and wait for every check it dispatched to finish.
    /// The background driver does not wait; this entry point exists for
    /// embedders and tests that need deterministic completion.
    pub async fn run_pending(&self) {
        for handle in self.inner.tick() {
            let _ = handle.await;
        }
    }

    /// Stop the driver, waiting up to the configured shutdown timeout.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let handle = self.driver.lock().expect("lock").take();
        if let Some(handle) = handle {
            let timeout = Duration::from_secs(self.inner.scheduler.shutdown_timeout_secs);
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("scheduler driver did not stop within {timeout:?}, aborting");
            }
        }
    }
}

impl SchedulerInner {
    fn cadence(&self, check_type: CheckType) -> ChronoDuration {
        let hours = match check_type {
            CheckType::StatisticalAnalysis => self.scheduler.statistical_check_hours,
            CheckType::PerformanceReview => self.scheduler.performance_check_hours,
            CheckType::AnomalyDetection => self.scheduler.anomaly_check_hours,
        };
        ChronoDuration::hours(hours)
    }

    fn register_checks(&self, experiment: &Experiment) {
        let now = Utc::now();
        self.checks.entry(experiment.id).or_insert_with(|| {
            let mut list = Vec::with_capacity(3);

            // first statistical check only after a full cadence period
            let mut statistical = ScheduledCheck::new(
                experiment.id,
                CheckType::StatisticalAnalysis,
                now + self.cadence(CheckType::StatisticalAnalysis),
            );
            statistical
                .parameters
                .insert("check_frequency".to_string(), "daily".to_string());
            list.push(statistical);

            if self.automation.enable_performance_gating {
                let mut performance = ScheduledCheck::new(
                    experiment.id,
                    CheckType::PerformanceReview,
                    now + self.cadence(CheckType::PerformanceReview),
                );
                performance
                    .parameters
                    .insert("check_frequency".to_string(), "4_hours".to_string());
                list.push(performance);
            }

            if self.automation.enable_anomaly_detection {
                let mut anomaly = ScheduledCheck::new(
                    experiment.id,
                    CheckType::AnomalyDetection,
                    now + self.cadence(CheckType::AnomalyDetection),
                );
                anomaly
                    .parameters
                    .insert("check_frequency".to_string(), "hourly".to_string());
                list.push(anomaly);
            }

            info!(
                experiment_id = %experiment.id,
                checks = list.len(),
                "scheduled experiment checks"
            );
            list
        });
    }

    /// Fan out every due check, one task per experiment.
    fn tick(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let now = Utc::now();
        let mut handles = Vec::new();

        let experiment_ids: Vec<Uuid> = self.checks.iter().map(|entry| *entry.key()).collect();

        for experiment_id in experiment_ids {
            let due: Vec<ScheduledCheck> = self
                .checks
                .get(&experiment_id)
                .map(|checks| checks.iter().filter(|c| c.is_due(now)).cloned().collect())
                .unwrap_or_default();

            if due.is_empty() {
                continue;
            }

            // an experiment still executing from a previous tick is
            // skipped, never raced
            if self.in_flight.insert(experiment_id, ()).is_some() {
                debug!(experiment_id = %experiment_id, "checks still in flight, skipping tick");
                continue;
            }

            let inner = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                for check in due {
                    if let Err(e) = inner.execute_check(&check).await {
                        warn!(
                            experiment_id = %experiment_id,
                            check_type = check.check_type.as_str(),
                            "scheduled check failed: {e}"
                        );
                        inner.notifier.dispatch(Notification::new(
                            NotificationEvent::OperationalAlert,
                            experiment_id,
                            format!("Scheduled {} check failed: {e}", check.check_type.as_str()),
                        ));
                    }
                    inner.reschedule(&check);
                }
                inner.in_flight.remove(&experiment_id);
            }));
        }

        handles
    }

    /// Reschedule an executed check at now + cadence. A check whose
    /// experiment was unwatched in the meantime stays removed.
    fn reschedule(&self, completed: &ScheduledCheck) {
        if let Some(mut checks) = self.checks.get_mut(&completed.experiment_id) {
            if let Some(check) = checks
                .iter_mut()
                .find(|c| c.check_type == completed.check_type)
            {
                check.next_check_time = Utc::now() + self.cadence(completed.check_type);
            }
        }
    }

    async fn execute_check(&self, check: &ScheduledCheck) -> Result<()> {
        let experiment = self
            .store
            .get_experiment(&check.experiment_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(check.experiment_id.to_string()))?;

        // a stop or pause that raced this check wins
        if experiment.status != ExperimentStatus::Running {
            debug!(
                experiment_id = %experiment.id,
                status = ?experiment.status,
                "experiment no longer running, skipping check"
            );
            return Ok(());
        }

        match check.check_type {
            CheckType::StatisticalAnalysis => self.statistical_check(&experiment).await,
            CheckType::PerformanceReview => self.performance_check(&experiment).await,
            CheckType::AnomalyDetection => self.anomaly_check(&experiment).await,
        }
    }

    async fn statistical_check(&self, experiment: &Experiment) -> Result<()> {
        let analysis = self.analysis.analyze(&experiment.id)?;
        let now = Utc::now();

        let required = self.automation.minimum_sample_size * experiment.variants.len() as u64;
        let has_minimum_sample = analysis.total_participants >= required;
        let has_minimum_duration =
            experiment.duration_days(now) >= self.automation.minimum_test_duration_days;

        if !has_minimum_sample && !has_minimum_duration {
            debug!(
                experiment_id = %experiment.id,
                participants = analysis.total_participants,
                "minimum requirements not met yet"
            );
            return Ok(());
        }

        if self.automation.enable_automatic_decisions {
            let decision = DecisionPolicy::decide(experiment, &analysis, &self.automation, now);
            self.execute_decision(decision).await
        } else {
            if analysis.overall_significance.is_significant {
                self.notifier.dispatch(Notification::new(
                    NotificationEvent::SignificantResult,
                    experiment.id,
                    format!(
                        "Significant result achieved (p={:.4})",
                        analysis.overall_significance.p_value
                    ),
                ));
            }
            Ok(())
        }
    }

    async fn performance_check(&self, experiment: &Experiment) -> Result<()> {
        let analysis = self.analysis.analyze(&experiment.id)?;

        let degradations: Vec<_> = analysis
            .severe_anomalies()
            .filter(|a| a.kind == AnomalyKind::PerformanceDegradation)
            .collect();

        if degradations.is_empty() {
            return Ok(());
        }

        let reasoning = degradations
            .iter()
            .map(|a| a.description.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        if self.automation.enable_automatic_decisions {
            let decision = AutomatedDecision {
                experiment_id: experiment.id,
                decision: Decision::Pause,
                reasoning: reasoning.clone(),
                confidence: 0.9,
                recommended_actions: vec![
                    "Investigate performance issues".to_string(),
                    "Optimize variant implementation".to_string(),
                    "Consider reducing traffic allocation".to_string(),
                ],
                timestamp: Utc::now(),
                metadata: serde_json::json!({
                    "check": "performance_review",
                    "degradations": degradations.len(),
                }),
            };
            self.execute_decision(decision).await
        } else {
            warn!(experiment_id = %experiment.id, "performance degradation: {reasoning}");
            self.notifier.dispatch(Notification::new(
                NotificationEvent::PerformanceDegradation,
                experiment.id,
                format!("Performance degradation: {reasoning}"),
            ));
            Ok(())
        }
    }

    async fn anomaly_check(&self, experiment: &Experiment) -> Result<()> {
        let analysis = self.analysis.analyze(&experiment.id)?;

        let severe: Vec<_> = analysis.severe_anomalies().collect();
        if severe.is_empty() {
            return Ok(());
        }

        warn!(
            experiment_id = %experiment.id,
            anomalies = severe.len(),
            "severe anomalies detected"
        );

        let should_pause = self.automation.anomaly_action == AnomalyAction::Pause
            && self.automation.enable_automatic_decisions;

        if should_pause {
            let kinds: Vec<_> = severe.iter().map(|a| a.kind.as_str()).collect();
            let recommended_actions = severe
                .iter()
                .flat_map(|a| a.recommended_actions.iter().cloned())
                .collect();

            let decision = AutomatedDecision {
                experiment_id: experiment.id,
                decision: Decision::Pause,
                reasoning: format!("Anomalies detected: {}", kinds.join(", ")),
                confidence: 0.8,
                recommended_actions,
                timestamp: Utc::now(),
                metadata: serde_json::json!({
                    "check": "anomaly_detection",
                    "anomalies": kinds,
                }),
            };
            self.execute_decision(decision).await
        } else if self.automation.anomaly_action != AnomalyAction::Ignore {
            let descriptions = severe
                .iter()
                .map(|a| a.description.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            self.notifier.dispatch(Notification::new(
                NotificationEvent::AnomalyDetected,
                experiment.id,
                format!("Anomalies detected: {descriptions}"),
            ));
            Ok(())
        } else {
            Ok(())
        }
    }

    /// Append a decision to the history and carry out its side effect.
    ///
    /// A decision whose experiment stopped running while the check was in
    /// flight is discarded, never executed or recorded.
    async fn execute_decision(&self, decision: AutomatedDecision) -> Result<()> {
        let experiment_id = decision.experiment_id;

        let experiment = self
            .store
            .get_experiment(&experiment_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(experiment_id.to_string()))?;

        if experiment.status != ExperimentStatus::Running {
            debug!(
                experiment_id = %experiment_id,
                decision = ?decision.decision,
                "experiment left running state, discarding decision"
            );
            return Ok(());
        }

        info!(
            experiment_id = %experiment_id,
            decision = ?decision.decision,
            confidence = decision.confidence,
            "{}",
            decision.reasoning
        );

        self.history
            .entry(experiment_id)
            .or_default()
            .push(decision.clone());

        match decision.decision {
            Decision::ImplementWinner => {
                self.store.stop_experiment(&experiment_id)?;
                self.checks.remove(&experiment_id);
                self.notifier.dispatch(Notification::new(
                    NotificationEvent::ExperimentCompleted,
                    experiment_id,
                    format!("Winner implemented: {}", decision.reasoning),
                ));
                self.final_report(&decision);
            }
            Decision::Stop => {
                self.store.stop_experiment(&experiment_id)?;
                self.checks.remove(&experiment_id);
                self.notifier.dispatch(Notification::new(
                    NotificationEvent::ExperimentCompleted,
                    experiment_id,
                    format!("Experiment concluded: {}", decision.reasoning),
                ));
                self.final_report(&decision);
            }
            Decision::Pause => {
                self.store.pause_experiment(&experiment_id)?;
                self.checks.remove(&experiment_id);
            }
            Decision::RequireManualReview => {
                self.notifier.dispatch(Notification::new(
                    NotificationEvent::ManualReviewRequired,
                    experiment_id,
                    decision.reasoning.clone(),
                ));
            }
            Decision::Continue => {
                debug!(experiment_id = %experiment_id, "continuing experiment");
            }
        }

        self.notifier.dispatch(Notification::new(
            NotificationEvent::AutomatedDecision,
            experiment_id,
            format!(
                "Automated decision: {:?} ({})",
                decision.decision, decision.reasoning
            ),
        ));

        Ok(())
    }

    fn final_report(&self, decision: &AutomatedDecision) {
        if !self.reporting_enabled {
            return;
        }

        match self.analysis.executive_summary(&decision.experiment_id) {
            Ok(summary) => {
                self.notifier.dispatch_report(FinalReport {
                    summary,
                    decision: decision.clone(),
                    generated_at: Utc::now(),
                });
            }
            Err(e) => {
                warn!(
                    experiment_id = %decision.experiment_id,
                    "failed to build final report: {e}"
                );
            }
        }
    }
}
