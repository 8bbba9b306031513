//! Experiment statistics and automated-decision engine
//!
//! Runs concurrent A/B experiments over named variants, computes
//! frequentist significance on streamed conversion data, and periodically
//! decides without a human in the loop whether to continue, pause, stop,
//! or promote a winning variant.
//!
//! The engine is an explicitly constructed, dependency-injected instance:
//! it owns its store and scheduler, has no import-time side effects, and
//! is torn down with an explicit [`ABTestEngine::shutdown`].

pub mod analysis;
pub mod errors;
pub mod notify;
pub mod policy;
pub mod scheduler;
pub mod stats;
pub mod store;

pub use analysis::{
    AnalysisEngine, MetricsSource, NullMetricsSource, PerformanceSnapshot, PerformanceThresholds,
};
pub use errors::{EngineError, Result};
pub use notify::{LogSink, MemorySink, NotificationSink, Notifier, ReportSink};
pub use policy::DecisionPolicy;
pub use scheduler::AutomationScheduler;
pub use stats::{wilson_interval, SampleSizeCalculator, ZTest};
pub use store::{ExperimentStore, VariantAggregate};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use ab_automation_config::EngineConfig;
use ab_automation_types::{
    ABTestAnalysis, AutomatedDecision, ExecutiveSummary, Experiment, ExperimentDefinition,
    Notification, NotificationEvent, ScheduledCheck,
};

/// The engine facade: experiment lifecycle, participant traffic, analysis
/// reads, and automation control.
pub struct ABTestEngine {
    config: EngineConfig,
    store: Arc<ExperimentStore>,
    analysis: Arc<AnalysisEngine>,
    notifier: Arc<Notifier>,
    scheduler: AutomationScheduler,
}

impl ABTestEngine {
    /// Create an engine with the default metric source and log sinks.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_sinks(
            config,
            Arc::new(NullMetricsSource),
            Arc::new(LogSink),
            Arc::new(LogSink),
        )
    }

    /// Create an engine with injected collaborators.
    pub fn with_sinks(
        config: EngineConfig,
        metrics: Arc<dyn MetricsSource>,
        notification_sink: Arc<dyn NotificationSink>,
        report_sink: Arc<dyn ReportSink>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        let store = Arc::new(ExperimentStore::new(config.automation.clone()));
        let analysis = Arc::new(AnalysisEngine::new(
            store.clone(),
            metrics,
            config.statistics.clone(),
            config.automation.clone(),
        ));
        let notifier = Arc::new(Notifier::new(
            config.notifications.clone(),
            notification_sink,
            report_sink,
        ));
        let scheduler = AutomationScheduler::new(
            store.clone(),
            analysis.clone(),
            notifier.clone(),
            config.automation.clone(),
            config.scheduler.clone(),
            config.notifications.enable_automatic_reporting,
        );

        Ok(Self {
            config,
            store,
            analysis,
            notifier,
            scheduler,
        })
    }

    /// Validate and register a new experiment.
    pub fn create_experiment(&self, definition: ExperimentDefinition) -> Result<Experiment> {
        self.store.create_experiment(definition)
    }

    /// Start (or resume) an experiment and register its periodic checks.
    /// Starting an already-running experiment changes nothing and produces
    /// no duplicate checks.
    pub fn start_experiment(&self, experiment_id: &Uuid) -> Result<()> {
        self.store.start_experiment(experiment_id)?;

        let experiment = self
            .store
            .get_experiment(experiment_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(experiment_id.to_string()))?;

        self.scheduler.watch(&experiment);
        self.notifier.dispatch(Notification::new(
            NotificationEvent::ExperimentStarted,
            *experiment_id,
            format!("Experiment '{}' started", experiment.name),
        ));

        Ok(())
    }

    /// Pause a running experiment and remove its future checks.
    pub fn pause_experiment(&self, experiment_id: &Uuid) -> Result<()> {
        self.store.pause_experiment(experiment_id)?;
        self.scheduler.unwatch(experiment_id);
        Ok(())
    }

    /// Complete an experiment and remove its future checks.
    pub fn stop_experiment(&self, experiment_id: &Uuid) -> Result<()> {
        self.store.stop_experiment(experiment_id)?;
        self.scheduler.unwatch(experiment_id);
        self.notifier.dispatch(Notification::new(
            NotificationEvent::ExperimentCompleted,
            *experiment_id,
            "Experiment stopped".to_string(),
        ));
        Ok(())
    }

    /// Deterministically assign a participant to a variant, or `None` when
    /// the experiment is not running or the participant is outside the
    /// traffic allocation.
    pub fn assign_variant(&self, experiment_id: &Uuid, user_id: &str) -> Result<Option<Uuid>> {
        self.store.assign_variant(experiment_id, user_id)
    }

    /// Record a conversion event for an assigned participant; a no-op for
    /// unassigned users.
    pub fn record_conversion(
        &self,
        experiment_id: &Uuid,
        user_id: &str,
        event_type: &str,
        value: Option<f64>,
    ) -> Result<()> {
        self.store
            .record_conversion(experiment_id, user_id, event_type, value)
    }

    /// Current analysis; experiments with insufficient data yield a valid
    /// low-confidence analysis rather than an error.
    pub fn get_analysis(&self, experiment_id: &Uuid) -> Result<ABTestAnalysis> {
        self.analysis.analyze(experiment_id)
    }

    /// Executive-level summary, safe to poll from a dashboard.
    pub fn get_executive_summary(&self, experiment_id: &Uuid) -> Result<ExecutiveSummary> {
        self.analysis.executive_summary(experiment_id)
    }

    /// Append-only audit trail of automated decisions.
    pub fn get_decision_history(&self, experiment_id: &Uuid) -> Vec<AutomatedDecision> {
        self.scheduler.decision_history(experiment_id)
    }

    /// Currently scheduled checks for an experiment.
    pub fn scheduled_checks(&self, experiment_id: &Uuid) -> Vec<ScheduledCheck> {
        self.scheduler.scheduled_checks(experiment_id)
    }

    pub fn get_experiment(&self, experiment_id: &Uuid) -> Option<Experiment> {
        self.store.get_experiment(experiment_id)
    }

    pub fn list_experiments(&self) -> Vec<Experiment> {
        self.store.list_experiments()
    }

    pub fn list_active_experiments(&self) -> Vec<Experiment> {
        self.store.list_active_experiments()
    }

    /// Required sample size per variant for a baseline rate, using the
    /// configured power and significance defaults.
    pub fn required_sample_size(&self, baseline_rate: f64) -> Result<u64> {
        SampleSizeCalculator::new(
            baseline_rate,
            self.config.statistics.minimum_detectable_effect,
            self.config.statistics.statistical_power,
            self.config.statistics.significance_level,
        )?
        .calculate()
    }

    /// Start the background automation driver and the notification worker.
    /// Must be called from a tokio runtime context.
    pub fn start_automation(&self) {
        info!("starting automation");
        self.notifier.start();
        self.scheduler.start();
    }

    /// Run one scheduler pass to completion. Useful for embedders that
    /// drive the engine on their own cadence instead of the background
    /// driver.
    pub async fn run_pending_checks(&self) {
        self.scheduler.run_pending().await;
    }

    /// Stop the automation driver and drain the notification queue.
    /// Idempotent.
    pub async fn shutdown(&self) {
        info!("shutting down engine");
        self.scheduler.shutdown().await;
        self.notifier
            .shutdown(Duration::from_secs(
                self.config.scheduler.shutdown_timeout_secs,
            ))
            .await;
    }
}
