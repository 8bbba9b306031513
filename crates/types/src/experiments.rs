//! Experiment, variant, and participant types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Status of an experiment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Draft,
    Scheduled,
    Running,
    Paused,
    Completed,
    Cancelled,
    Archived,
}

impl ExperimentStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExperimentStatus::Completed | ExperimentStatus::Cancelled | ExperimentStatus::Archived
        )
    }
}

/// Primary metric an experiment optimizes for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryMetric {
    ConversionRate,
    ClickThroughRate,
    EngagementRate,
    InquirySubmissionRate,
    FormCompletionRate,
}

/// Secondary metrics tracked alongside the primary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryMetric {
    BounceRate,
    PageViews,
    SessionDuration,
    ScrollDepth,
    CtaClickRate,
}

/// Per-component variant payload, consumed only by UI collaborators.
///
/// The engine treats this as opaque: no automation logic may branch on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "component", content = "settings", rename_all = "snake_case")]
pub enum VariantConfig {
    Hero(HeroConfig),
    Grid(GridConfig),
    Cta(CtaConfig),
    /// Escape hatch for components the engine does not know about.
    Opaque(serde_json::Value),
}

impl Default for VariantConfig {
    fn default() -> Self {
        VariantConfig::Opaque(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HeroConfig {
    pub headline: Option<String>,
    pub subheadline: Option<String>,
    pub layout: Option<String>,
    pub cta_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GridConfig {
    pub columns: Option<u8>,
    pub items_per_page: Option<u16>,
    pub card_design: Option<String>,
    pub show_ratings: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CtaConfig {
    pub text: Option<String>,
    pub variant: Option<String>,
    pub size: Option<String>,
    pub position: Option<String>,
}

/// A single variant in an A/B experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Unique variant identifier
    pub id: Uuid,
    /// Variant name (e.g., "control", "variant_a")
    pub name: String,
    /// Human description
    pub description: String,
    /// Whether this is the control arm
    pub is_control: bool,
    /// Traffic weight in percent; weights across variants sum to 100
    pub traffic_weight: f64,
    /// Whether this variant currently receives traffic
    pub enabled: bool,
    /// Opaque configuration payload
    pub config: VariantConfig,
}

impl Variant {
    /// Create a new variant
    pub fn new(name: impl Into<String>, traffic_weight: f64, is_control: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            is_control,
            traffic_weight,
            enabled: true,
            config: VariantConfig::default(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the configuration payload
    pub fn with_config(mut self, config: VariantConfig) -> Self {
        self.config = config;
        self
    }
}

/// Caller-supplied experiment definition, validated before any state exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    pub name: String,
    pub description: String,
    pub variants: Vec<Variant>,
    /// Percentage of eligible traffic admitted into the experiment (0-100)
    pub traffic_allocation: f64,
    pub primary_metric: PrimaryMetric,
    pub secondary_metrics: Vec<SecondaryMetric>,
    /// Alpha level for significance testing
    pub significance_level: f64,
    /// Minimum relative effect the experiment is powered to detect
    pub minimum_detectable_effect: f64,
    /// Target statistical power (1 - beta)
    pub statistical_power: f64,
    pub metadata: HashMap<String, String>,
}

impl ExperimentDefinition {
    pub fn new(name: impl Into<String>, variants: Vec<Variant>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            variants,
            traffic_allocation: 100.0,
            primary_metric: PrimaryMetric::ConversionRate,
            secondary_metrics: Vec::new(),
            significance_level: 0.05,
            minimum_detectable_effect: 0.05,
            statistical_power: 0.8,
            metadata: HashMap::new(),
        }
    }

    pub fn with_traffic_allocation(mut self, allocation: f64) -> Self {
        self.traffic_allocation = allocation;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// An A/B experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    /// Unique experiment identifier
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub status: ExperimentStatus,
    /// Variants being tested; exactly one is the control
    pub variants: Vec<Variant>,
    /// Percentage of eligible traffic admitted (0-100)
    pub traffic_allocation: f64,
    pub primary_metric: PrimaryMetric,
    pub secondary_metrics: Vec<SecondaryMetric>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub significance_level: f64,
    pub minimum_detectable_effect: f64,
    pub statistical_power: f64,
    pub metadata: HashMap<String, String>,
}

impl Experiment {
    /// Build an experiment from a validated definition
    pub fn from_definition(def: ExperimentDefinition, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: def.name,
            description: def.description,
            status: ExperimentStatus::Draft,
            variants: def.variants,
            traffic_allocation: def.traffic_allocation,
            primary_metric: def.primary_metric,
            secondary_metrics: def.secondary_metrics,
            start_date: now,
            end_date: None,
            significance_level: def.significance_level,
            minimum_detectable_effect: def.minimum_detectable_effect,
            statistical_power: def.statistical_power,
            metadata: def.metadata,
        }
    }

    /// The control variant, if the invariant holds
    pub fn control(&self) -> Option<&Variant> {
        self.variants.iter().find(|v| v.is_control)
    }

    /// Variants currently eligible for assignment
    pub fn enabled_variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter().filter(|v| v.enabled)
    }

    /// Whole days elapsed since the experiment started
    pub fn duration_days(&self, now: DateTime<Utc>) -> i64 {
        let end = self.end_date.unwrap_or(now);
        (end - self.start_date).num_days()
    }
}

/// Immutable record of a participant's variant assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantAssignment {
    pub experiment_id: Uuid,
    pub user_id: String,
    pub variant_id: Uuid,
    pub assigned_at: DateTime<Utc>,
}

/// A single conversion event, appended for assigned participants only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub experiment_id: Uuid,
    pub user_id: String,
    pub event_type: String,
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}
