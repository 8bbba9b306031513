//! Core types and data models for the A/B experiment automation engine
//!
//! This crate provides the fundamental data structures shared across the
//! engine: experiments and variants, derived analysis artifacts, and
//! automated decision records.

pub mod analysis;
pub mod decisions;
pub mod experiments;

pub use analysis::{
    ABTestAnalysis, Anomaly, AnomalyKind, AnomalySeverity, ConfidenceInterval, ExecutiveSummary,
    Insight, InsightKind, Recommendation, SignificanceResult, StrategicValue, VariantRecommendation,
    VariantResult,
};
pub use decisions::{
    AutomatedDecision, CheckType, Decision, FinalReport, Notification, NotificationEvent,
    ScheduledCheck,
};
pub use experiments::{
    ConversionEvent, Experiment, ExperimentDefinition, ExperimentStatus, ParticipantAssignment,
    PrimaryMetric, SecondaryMetric, Variant, VariantConfig,
};
