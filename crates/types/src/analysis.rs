//! Derived analysis artifacts
//!
//! Everything in this module is recomputed on demand from store data and
//! never mutated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a two-sample significance test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub is_significant: bool,
    pub p_value: f64,
    pub z_score: f64,
    pub effect_size: f64,
    /// Test method label, e.g. "two_sample_z_test"
    pub method: String,
}

impl SignificanceResult {
    /// The null result used when no comparison is possible.
    pub fn inconclusive() -> Self {
        Self {
            is_significant: false,
            p_value: 1.0,
            z_score: 0.0,
            effect_size: 0.0,
            method: "two_sample_z_test".to_string(),
        }
    }
}

/// Wilson score confidence interval for a proportion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Confidence level (e.g., 0.95 for 95%)
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
    pub margin: f64,
}

/// Advisory tag attached to a variant result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VariantRecommendation {
    ImplementWinner,
    ContinueTesting,
    StopExperiment,
    ExtendDuration,
}

/// Per-variant derived result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantResult {
    pub experiment_id: Uuid,
    pub variant_id: Uuid,
    pub variant_name: String,
    pub sample_size: u64,
    pub conversion_count: u64,
    pub conversion_rate: f64,
    pub confidence_interval: ConfidenceInterval,
    /// Significance of this variant against the control arm
    pub significance: SignificanceResult,
    pub recommendation: VariantRecommendation,
    pub computed_at: DateTime<Utc>,
}

/// Severity of a detected anomaly, ordered least to most severe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Kind of structural irregularity detected in experiment data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    SampleRatioMismatch,
    PerformanceDegradation,
    ConversionRateAnomaly,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::SampleRatioMismatch => "sample_ratio_mismatch",
            AnomalyKind::PerformanceDegradation => "performance_degradation",
            AnomalyKind::ConversionRateAnomaly => "conversion_rate_anomaly",
        }
    }
}

/// A structural irregularity, distinct from a statistical result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub description: String,
    pub severity: AnomalySeverity,
    pub affected_variants: Vec<Uuid>,
    pub detected_at: DateTime<Utc>,
    pub possible_causes: Vec<String>,
    pub recommended_actions: Vec<String>,
}

/// Kind of advisory insight
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    ConversionPattern,
    TimeBasedVariation,
}

/// Advisory insight attached to an analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub impact: ImpactLevel,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Statistical,
    Business,
    Technical,
}

/// Human-readable recommendation. Advisory only: automation logic never
/// branches on these strings; DecisionPolicy re-derives its own verdict
/// from raw significance and anomaly data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: RecommendationPriority,
    pub category: RecommendationCategory,
    pub recommendation: String,
    pub reasoning: String,
    pub expected_outcome: String,
    pub timeframe: String,
}

/// Experiment-level analysis aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ABTestAnalysis {
    pub experiment_id: Uuid,
    pub analysis_date: DateTime<Utc>,
    pub total_participants: u64,
    pub variant_results: Vec<VariantResult>,
    /// Control vs. best treatment
    pub overall_significance: SignificanceResult,
    pub winner: Option<Uuid>,
    pub loser: Option<Uuid>,
    pub insights: Vec<Insight>,
    pub anomalies: Vec<Anomaly>,
    pub recommendations: Vec<Recommendation>,
    pub next_steps: Vec<String>,
}

impl ABTestAnalysis {
    /// Anomalies severe enough to gate automated decisions.
    pub fn severe_anomalies(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies
            .iter()
            .filter(|a| a.severity >= AnomalySeverity::High)
    }
}

/// Strategic value band derived from the observed improvement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategicValue {
    Low,
    Medium,
    High,
}

/// Executive-level summary of an experiment, safe to poll from dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub experiment_id: Uuid,
    pub experiment_name: String,
    pub duration_days: i64,
    pub total_participants: u64,
    pub winning_variant: Option<Uuid>,
    /// Relative conversion improvement of the winner over the loser, percent
    pub improvement_rate_pct: f64,
    /// (1 - p) expressed as a percentage
    pub confidence_level_pct: f64,
    pub strategic_value: StrategicValue,
    pub key_insights: Vec<String>,
    pub risks: Vec<String>,
    pub next_steps: Vec<String>,
    pub generated_at: DateTime<Utc>,
}
