//! Automated decision and scheduling types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::analysis::ExecutiveSummary;

/// The automation engine's verdict on an experiment's fate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Continue,
    Pause,
    Stop,
    ImplementWinner,
    RequireManualReview,
}

/// One entry in an experiment's append-only decision history.
///
/// Decisions are never edited or deleted, only appended, giving a full
/// audit trail in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomatedDecision {
    pub experiment_id: Uuid,
    pub decision: Decision,
    pub reasoning: String,
    /// Engine confidence in this verdict (0.0-1.0)
    pub confidence: f64,
    pub recommended_actions: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Kind of periodic check the scheduler runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    StatisticalAnalysis,
    PerformanceReview,
    AnomalyDetection,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::StatisticalAnalysis => "statistical_analysis",
            CheckType::PerformanceReview => "performance_review",
            CheckType::AnomalyDetection => "anomaly_detection",
        }
    }
}

/// A due-time entry in the scheduler's per-experiment check list.
///
/// Created when an experiment starts running, rescheduled after every
/// execution, removed when the experiment leaves `Running`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledCheck {
    pub experiment_id: Uuid,
    pub next_check_time: DateTime<Utc>,
    pub check_type: CheckType,
    pub parameters: HashMap<String, String>,
}

impl ScheduledCheck {
    pub fn new(experiment_id: Uuid, check_type: CheckType, next_check_time: DateTime<Utc>) -> Self {
        Self {
            experiment_id,
            next_check_time,
            check_type,
            parameters: HashMap::new(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_check_time <= now
    }
}

/// Events dispatched to notification sinks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    ExperimentStarted,
    SignificantResult,
    AnomalyDetected,
    PerformanceDegradation,
    ExperimentCompleted,
    ManualReviewRequired,
    AutomatedDecision,
    /// A scheduled check failed; surfaced instead of silently swallowed
    OperationalAlert,
}

/// Fire-and-forget message to external collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub event: NotificationEvent,
    pub experiment_id: Uuid,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(event: NotificationEvent, experiment_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            event,
            experiment_id,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Final report emitted when automation concludes an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub summary: ExecutiveSummary,
    /// The decision that concluded the experiment
    pub decision: AutomatedDecision,
    pub generated_at: DateTime<Utc>,
}
