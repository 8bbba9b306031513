//! Configuration management for the A/B experiment automation engine

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Automated decision-making settings
    pub automation: AutomationConfig,

    /// Statistical test parameters
    pub statistics: StatisticsConfig,

    /// Background check scheduling
    pub scheduler: SchedulerConfig,

    /// Notification and reporting dispatch
    pub notifications: NotificationConfig,

    /// Observability settings
    pub observability: ObservabilityConfig,
}

impl EngineConfig {
    /// Load configuration from an optional YAML file and environment.
    ///
    /// Environment variables are prefixed with `ABTEST_` and nested with
    /// `__`, e.g. `ABTEST_AUTOMATION__CONFIDENCE_THRESHOLD=0.99`.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed("ABTEST_").split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))
    }

    /// Validate configuration invariants
    pub fn validate(&self) -> Result<()> {
        let a = &self.automation;

        if a.confidence_threshold <= 0.0 || a.confidence_threshold >= 1.0 {
            return Err(ConfigError::ValidationError(
                "confidence_threshold must be in (0, 1)".to_string(),
            ));
        }

        if a.require_manual_approval_threshold <= 0.0 {
            return Err(ConfigError::ValidationError(
                "require_manual_approval_threshold must be positive".to_string(),
            ));
        }

        if a.max_traffic_allocation <= 0.0 || a.max_traffic_allocation > 100.0 {
            return Err(ConfigError::ValidationError(
                "max_traffic_allocation must be in (0, 100]".to_string(),
            ));
        }

        if a.traffic_ratio_deviation_threshold <= 0.0 || a.traffic_ratio_deviation_threshold >= 1.0
        {
            return Err(ConfigError::ValidationError(
                "traffic_ratio_deviation_threshold must be in (0, 1)".to_string(),
            ));
        }

        let s = &self.statistics;
        if s.significance_level <= 0.0 || s.significance_level >= 1.0 {
            return Err(ConfigError::ValidationError(
                "significance_level must be in (0, 1)".to_string(),
            ));
        }
        if s.statistical_power <= 0.0 || s.statistical_power >= 1.0 {
            return Err(ConfigError::ValidationError(
                "statistical_power must be in (0, 1)".to_string(),
            ));
        }

        if self.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tick_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.notifications.queue_size == 0 {
            return Err(ConfigError::ValidationError(
                "notification queue_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// What to do when a severe anomaly is detected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyAction {
    Pause,
    Alert,
    Ignore,
}

/// Automated decision-making configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Whether the engine may execute decisions without a human in the loop
    pub enable_automatic_decisions: bool,

    /// Minimum confidence for automatic winner implementation
    pub confidence_threshold: f64,

    /// Minimum participants per variant before any decision
    pub minimum_sample_size: u64,

    /// Minimum experiment age in days before early stopping
    pub minimum_test_duration_days: i64,

    /// Whether performance review checks are scheduled at all
    pub enable_performance_gating: bool,

    /// Percentage degradation that triggers a pause
    pub performance_degradation_threshold: f64,

    /// Whether anomaly detection checks are scheduled at all
    pub enable_anomaly_detection: bool,

    /// Response to severe anomalies
    pub anomaly_action: AnomalyAction,

    /// Reject experiment definitions above the traffic cap
    pub enable_safety_checks: bool,

    /// Maximum percentage of traffic any experiment may claim
    pub max_traffic_allocation: f64,

    /// Effect size above which implementation requires manual approval
    pub require_manual_approval_threshold: f64,

    /// Traffic share deviation (as a fraction) flagged as a sample ratio
    /// mismatch. Carried forward from the source system as a configurable
    /// default.
    pub traffic_ratio_deviation_threshold: f64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enable_automatic_decisions: false,
            confidence_threshold: 0.95,
            minimum_sample_size: 100,
            minimum_test_duration_days: 7,
            enable_performance_gating: true,
            performance_degradation_threshold: 20.0,
            enable_anomaly_detection: true,
            anomaly_action: AnomalyAction::Alert,
            enable_safety_checks: true,
            max_traffic_allocation: 50.0,
            require_manual_approval_threshold: 0.3,
            traffic_ratio_deviation_threshold: 0.10,
        }
    }
}

/// Statistical test parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Alpha level for significance testing
    pub significance_level: f64,

    /// Target statistical power (1 - beta)
    pub statistical_power: f64,

    /// Default minimum detectable effect (relative)
    pub minimum_detectable_effect: f64,

    /// Confidence level for per-variant intervals
    pub confidence_level: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            statistical_power: 0.8,
            minimum_detectable_effect: 0.05,
            confidence_level: 0.95,
        }
    }
}

/// Background check scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Driver wake-up interval in seconds
    pub tick_interval_secs: u64,

    /// Cadence of statistical analysis checks (also the initial delay)
    pub statistical_check_hours: i64,

    /// Cadence of performance review checks
    pub performance_check_hours: i64,

    /// Cadence of anomaly detection checks
    pub anomaly_check_hours: i64,

    /// Grace period for the driver to finish on shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            statistical_check_hours: 24,
            performance_check_hours: 4,
            anomaly_check_hours: 1,
            shutdown_timeout_secs: 30,
        }
    }
}

/// How often final reports are produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportingFrequency {
    Daily,
    Weekly,
    ExperimentCompletion,
}

/// Notification and reporting dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Whether notifications are dispatched at all
    pub enable_notifications: bool,

    /// Bounded dispatch queue size; overflow is dropped with a warning
    pub queue_size: usize,

    /// Delivery attempts per notification before giving up
    pub max_retries: u32,

    /// Base backoff between retries in milliseconds, doubled per attempt
    pub retry_backoff_ms: u64,

    /// Whether final reports are produced when automation concludes a test
    pub enable_automatic_reporting: bool,

    pub reporting_frequency: ReportingFrequency,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enable_notifications: false,
            queue_size: 1024,
            max_retries: 3,
            retry_backoff_ms: 500,
            enable_automatic_reporting: false,
            reporting_frequency: ReportingFrequency::ExperimentCompletion,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level filter
    pub log_level: String,

    /// Enable structured JSON logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}
