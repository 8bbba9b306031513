//! Experiment analysis
//!
//! Computes per-variant results and the experiment-level analysis from
//! store data. Analyses are derived values: recomputed on demand, never
//! stored or mutated in place. An experiment with insufficient data yields
//! a valid low-confidence analysis, never an error, so dashboards need no
//! special casing for "too early to tell".

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{EngineError, Result};
use crate::stats::{wilson_interval, ZTest};
use crate::store::{ExperimentStore, VariantAggregate};
use ab_automation_config::{AutomationConfig, StatisticsConfig};
use ab_automation_types::{
    ABTestAnalysis, Anomaly, AnomalyKind, AnomalySeverity, ExecutiveSummary, Experiment, Insight,
    InsightKind, Recommendation, SignificanceResult, StrategicValue, VariantRecommendation,
    VariantResult,
};
use ab_automation_types::analysis::{ImpactLevel, RecommendationCategory, RecommendationPriority};

/// Point-in-time performance reading for an experiment's variants
#[derive(Debug, Clone, Copy)]
pub struct PerformanceSnapshot {
    pub render_time_ms: f64,
    pub interaction_latency_ms: f64,
    pub memory_bytes: f64,
}

/// Acceptable performance ceilings for experiment surfaces
#[derive(Debug, Clone, Copy)]
pub struct PerformanceThresholds {
    pub render_time_ms: f64,
    pub interaction_latency_ms: f64,
    pub memory_bytes: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            render_time_ms: 50.0,
            interaction_latency_ms: 200.0,
            memory_bytes: 100.0 * 1024.0 * 1024.0,
        }
    }
}

/// Source of live performance metrics.
///
/// Injected so tests supply deterministic fixtures instead of reading real
/// telemetry.
pub trait MetricsSource: Send + Sync {
    /// Latest performance reading for the experiment, or `None` when no
    /// data is available (no data means no degradation).
    fn performance_snapshot(&self, experiment_id: &Uuid) -> Option<PerformanceSnapshot>;
}

/// Metrics source that reports no data
#[derive(Debug, Default)]
pub struct NullMetricsSource;

impl MetricsSource for NullMetricsSource {
    fn performance_snapshot(&self, _experiment_id: &Uuid) -> Option<PerformanceSnapshot> {
        None
    }
}

/// Computes experiment-level analyses from store data
pub struct AnalysisEngine {
    store: Arc<ExperimentStore>,
    metrics: Arc<dyn MetricsSource>,
    statistics: StatisticsConfig,
    automation: AutomationConfig,
    thresholds: PerformanceThresholds,
}

impl AnalysisEngine {
    pub fn new(
        store: Arc<ExperimentStore>,
        metrics: Arc<dyn MetricsSource>,
        statistics: StatisticsConfig,
        automation: AutomationConfig,
    ) -> Self {
        Self {
            store,
            metrics,
            statistics,
            automation,
            thresholds: PerformanceThresholds::default(),
        }
    }

    /// Analyze an experiment's current state.
    pub fn analyze(&self, experiment_id: &Uuid) -> Result<ABTestAnalysis> {
        let experiment = self
            .store
            .get_experiment(experiment_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(experiment_id.to_string()))?;

        let aggregates = self.store.variant_aggregates(experiment_id)?;
        let with_data: Vec<_> = aggregates.iter().filter(|a| a.sample_size > 0).collect();

        if with_data.len() < 2 {
            debug!(experiment_id = %experiment_id, "insufficient data for analysis");
            return Ok(Self::insufficient_data_analysis(*experiment_id));
        }

        let control_id = experiment.control().map(|v| v.id);
        let control = control_id.and_then(|id| with_data.iter().find(|a| a.variant_id == id));

        let mut variant_results = Vec::with_capacity(with_data.len());
        for aggregate in &with_data {
            variant_results.push(self.variant_result(&experiment, aggregate, control.copied())?);
        }

        let (winner, loser, overall_significance) =
            Self::pick_winner(control.copied(), &variant_results);

        let total_participants: u64 = aggregates.iter().map(|a| a.sample_size).sum();

        let mut anomalies = self.detect_sample_ratio_anomalies(&with_data);
        anomalies.extend(self.detect_performance_anomalies(&experiment));

        let insights = Self::generate_insights(&variant_results);
        let recommendations = Self::generate_recommendations(&overall_significance);
        let next_steps = Self::generate_next_steps(&overall_significance, winner);

        Ok(ABTestAnalysis {
            experiment_id: *experiment_id,
            analysis_date: Utc::now(),
            total_participants,
            variant_results,
            overall_significance,
            winner,
            loser,
            insights,
            anomalies,
            recommendations,
            next_steps,
        })
    }

    /// The valid low-confidence analysis returned before enough data exists
    fn insufficient_data_analysis(experiment_id: Uuid) -> ABTestAnalysis {
        ABTestAnalysis {
            experiment_id,
            analysis_date: Utc::now(),
            total_participants: 0,
            variant_results: Vec::new(),
            overall_significance: SignificanceResult::inconclusive(),
            winner: None,
            loser: None,
            insights: Vec::new(),
            anomalies: Vec::new(),
            recommendations: vec![Recommendation {
                priority: RecommendationPriority::Medium,
                category: RecommendationCategory::Statistical,
                recommendation: "Insufficient data for analysis. Continue collecting data."
                    .to_string(),
                reasoning: "Need at least 2 variants with participant data for statistical analysis."
                    .to_string(),
                expected_outcome:
                    "Statistically significant results once minimum sample size is reached."
                        .to_string(),
                timeframe: "Continue current experiment".to_string(),
            }],
            next_steps: vec![
                "Continue data collection".to_string(),
                "Monitor for minimum sample size achievement".to_string(),
            ],
        }
    }

    fn variant_result(
        &self,
        experiment: &Experiment,
        aggregate: &VariantAggregate,
        control: Option<&VariantAggregate>,
    ) -> Result<VariantResult> {
        let significance = match control {
            Some(control) if control.variant_id != aggregate.variant_id => ZTest::new(
                control.converted_users,
                control.sample_size,
                aggregate.converted_users,
                aggregate.sample_size,
            )
            .two_sample(experiment.significance_level)?,
            _ => SignificanceResult::inconclusive(),
        };

        let confidence_interval = wilson_interval(
            aggregate.sample_size,
            aggregate.converted_users,
            self.statistics.confidence_level,
        )?;

        let recommendation = Self::variant_recommendation(&significance);

        Ok(VariantResult {
            experiment_id: experiment.id,
            variant_id: aggregate.variant_id,
            variant_name: aggregate.variant_name.clone(),
            sample_size: aggregate.sample_size,
            conversion_count: aggregate.converted_users,
            conversion_rate: aggregate.conversion_rate(),
            confidence_interval,
            significance,
            recommendation,
            computed_at: Utc::now(),
        })
    }

    /// Advisory per-variant tag; automation never branches on it
    fn variant_recommendation(significance: &SignificanceResult) -> VariantRecommendation {
        if significance.is_significant && significance.effect_size > 0.2 {
            VariantRecommendation::ImplementWinner
        } else if significance.p_value > 0.05 && significance.p_value < 0.1 {
            VariantRecommendation::ContinueTesting
        } else if significance.effect_size < 0.01 {
            VariantRecommendation::StopExperiment
        } else {
            VariantRecommendation::ExtendDuration
        }
    }

    /// A variant is a winner candidate only if it is significant against
    /// control with a strictly higher conversion rate. Among candidates the
    /// highest rate wins, ties broken by variant id for determinism.
    fn pick_winner(
        control: Option<&VariantAggregate>,
        results: &[VariantResult],
    ) -> (Option<Uuid>, Option<Uuid>, SignificanceResult) {
        let Some(control) = control else {
            return (None, None, SignificanceResult::inconclusive());
        };

        let control_rate = control.conversion_rate();
        let control_id = control.variant_id;

        let candidates: Vec<_> = results
            .iter()
            .filter(|r| {
                r.variant_id != control_id
                    && r.significance.is_significant
                    && r.conversion_rate > control_rate
            })
            .collect();

        let best = candidates.into_iter().min_by(|a, b| {
            b.conversion_rate
                .partial_cmp(&a.conversion_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.variant_id.cmp(&b.variant_id))
        });

        match best {
            Some(winner) => (
                Some(winner.variant_id),
                Some(control_id),
                winner.significance.clone(),
            ),
            None => {
                // Not significant overall: report the most promising p-value
                let min_p = results
                    .iter()
                    .filter(|r| r.variant_id != control_id)
                    .map(|r| r.significance.p_value)
                    .fold(1.0_f64, f64::min);

                let mut significance = SignificanceResult::inconclusive();
                significance.p_value = min_p;
                (None, None, significance)
            }
        }
    }

    /// Structural traffic-split check, independent of significance.
    ///
    /// Flags any variant whose share of traffic deviates from the expected
    /// even split by more than the configured threshold; severity escalates
    /// with the size of the deviation.
    fn detect_sample_ratio_anomalies(&self, with_data: &[&VariantAggregate]) -> Vec<Anomaly> {
        let total: u64 = with_data.iter().map(|a| a.sample_size).sum();
        if total == 0 || with_data.len() < 2 {
            return Vec::new();
        }

        let expected = 1.0 / with_data.len() as f64;
        let threshold = self.automation.traffic_ratio_deviation_threshold;
        let mut anomalies = Vec::new();

        for aggregate in with_data {
            let actual = aggregate.sample_size as f64 / total as f64;
            let deviation = (actual - expected).abs();
            if deviation <= threshold {
                continue;
            }

            let severity = if deviation > threshold * 4.0 {
                AnomalySeverity::Critical
            } else if deviation > threshold * 2.0 {
                AnomalySeverity::High
            } else {
                AnomalySeverity::Medium
            };

            anomalies.push(Anomaly {
                kind: AnomalyKind::SampleRatioMismatch,
                description: format!(
                    "Variant {} has {:.1}% of traffic instead of expected {:.1}%",
                    aggregate.variant_name,
                    actual * 100.0,
                    expected * 100.0
                ),
                severity,
                affected_variants: vec![aggregate.variant_id],
                detected_at: Utc::now(),
                possible_causes: vec![
                    "Implementation bug in traffic allocation".to_string(),
                    "User targeting criteria affecting distribution".to_string(),
                    "Bot traffic or unusual user behaviour".to_string(),
                ],
                recommended_actions: vec![
                    "Review traffic allocation configuration".to_string(),
                    "Check user assignment logic".to_string(),
                    "Investigate traffic sources".to_string(),
                ],
            });
        }

        anomalies
    }

    fn detect_performance_anomalies(&self, experiment: &Experiment) -> Vec<Anomaly> {
        let Some(snapshot) = self.metrics.performance_snapshot(&experiment.id) else {
            return Vec::new();
        };

        let t = &self.thresholds;
        let mut breaches = Vec::new();
        let mut worst_overshoot = 0.0_f64;

        let mut check = |label: &str, value: f64, limit: f64| {
            if value > limit {
                breaches.push(format!("{label}: {value:.2} > {limit:.2}"));
                worst_overshoot = worst_overshoot.max((value / limit - 1.0) * 100.0);
            }
        };

        check("render time (ms)", snapshot.render_time_ms, t.render_time_ms);
        check(
            "interaction latency (ms)",
            snapshot.interaction_latency_ms,
            t.interaction_latency_ms,
        );
        check("memory (bytes)", snapshot.memory_bytes, t.memory_bytes);

        if breaches.is_empty() {
            return Vec::new();
        }

        // Beyond the configured degradation percentage the breach gates
        // automated decisions
        let severity = if worst_overshoot > self.automation.performance_degradation_threshold {
            AnomalySeverity::High
        } else {
            AnomalySeverity::Medium
        };

        vec![Anomaly {
            kind: AnomalyKind::PerformanceDegradation,
            description: format!("Performance degradation detected: {}", breaches.join(", ")),
            severity,
            affected_variants: experiment.variants.iter().map(|v| v.id).collect(),
            detected_at: Utc::now(),
            possible_causes: vec![
                "Heavy variant implementation".to_string(),
                "Regression in shared rendering path".to_string(),
            ],
            recommended_actions: vec![
                "Investigate performance issues".to_string(),
                "Optimize variant implementation".to_string(),
                "Consider reducing traffic allocation".to_string(),
            ],
        }]
    }

    fn generate_insights(results: &[VariantResult]) -> Vec<Insight> {
        let Some(best_rate) = results
            .iter()
            .map(|r| r.conversion_rate)
            .fold(None::<f64>, |acc, r| Some(acc.map_or(r, |a| a.max(r))))
        else {
            return Vec::new();
        };

        vec![Insight {
            kind: InsightKind::ConversionPattern,
            title: "Conversion Rate Analysis".to_string(),
            description: format!(
                "Best performing variant achieved {:.2}% conversion rate.",
                best_rate * 100.0
            ),
            impact: ImpactLevel::High,
            confidence: 0.95,
        }]
    }

    fn generate_recommendations(significance: &SignificanceResult) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        if significance.is_significant {
            recommendations.push(Recommendation {
                priority: RecommendationPriority::High,
                category: RecommendationCategory::Business,
                recommendation: "Implement winning variant to production".to_string(),
                reasoning: format!(
                    "Statistical significance achieved with p-value {:.4}",
                    significance.p_value
                ),
                expected_outcome: "Expected improvement in conversion rate".to_string(),
                timeframe: "1-2 weeks".to_string(),
            });
        } else if significance.p_value < 0.1 {
            recommendations.push(Recommendation {
                priority: RecommendationPriority::Medium,
                category: RecommendationCategory::Statistical,
                recommendation: "Continue experiment to achieve statistical significance"
                    .to_string(),
                reasoning: "Trending towards significance but requires more data".to_string(),
                expected_outcome: "Statistical significance with continued data collection"
                    .to_string(),
                timeframe: "Continue for 1-2 more weeks".to_string(),
            });
        }

        recommendations
    }

    fn generate_next_steps(significance: &SignificanceResult, winner: Option<Uuid>) -> Vec<String> {
        if significance.is_significant && winner.is_some() {
            vec![
                "Prepare implementation plan for winning variant".to_string(),
                "Schedule stakeholder review of results".to_string(),
                "Plan gradual rollout strategy".to_string(),
            ]
        } else {
            vec![
                "Continue data collection".to_string(),
                "Monitor for statistical significance".to_string(),
                "Review experiment parameters if needed".to_string(),
            ]
        }
    }

    /// Executive-level rollup of the current analysis
    pub fn executive_summary(&self, experiment_id: &Uuid) -> Result<ExecutiveSummary> {
        let experiment = self
            .store
            .get_experiment(experiment_id)
            .ok_or_else(|| EngineError::ExperimentNotFound(experiment_id.to_string()))?;
        let analysis = self.analyze(experiment_id)?;

        let best = analysis
            .variant_results
            .iter()
            .max_by(|a, b| {
                a.conversion_rate
                    .partial_cmp(&b.conversion_rate)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        let improvement_rate_pct = match (analysis.winner, analysis.loser, best) {
            (Some(_), Some(loser_id), Some(best)) => {
                let loser_rate = analysis
                    .variant_results
                    .iter()
                    .find(|r| r.variant_id == loser_id)
                    .map(|r| r.conversion_rate)
                    .unwrap_or(0.0);
                if loser_rate > 0.0 {
                    (best.conversion_rate - loser_rate) / loser_rate * 100.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        let strategic_value = if improvement_rate_pct > 20.0 {
            StrategicValue::High
        } else if improvement_rate_pct > 10.0 {
            StrategicValue::Medium
        } else {
            StrategicValue::Low
        };

        Ok(ExecutiveSummary {
            experiment_id: *experiment_id,
            experiment_name: experiment.name.clone(),
            duration_days: experiment.duration_days(Utc::now()),
            total_participants: analysis.total_participants,
            winning_variant: analysis.winner,
            improvement_rate_pct,
            confidence_level_pct: (1.0 - analysis.overall_significance.p_value) * 100.0,
            strategic_value,
            key_insights: analysis.insights.iter().map(|i| i.title.clone()).collect(),
            risks: analysis
                .anomalies
                .iter()
                .map(|a| a.description.clone())
                .collect(),
            next_steps: analysis.next_steps,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use ab_automation_types::{ExperimentDefinition, Variant};

    fn build_engine(metrics: Arc<dyn MetricsSource>) -> (Arc<ExperimentStore>, AnalysisEngine) {
        let automation = AutomationConfig {
            enable_safety_checks: false,
            ..Default::default()
        };
        let store = Arc::new(ExperimentStore::new(automation.clone()));
        let engine = AnalysisEngine::new(
            store.clone(),
            metrics,
            StatisticsConfig::default(),
            automation,
        );
        (store, engine)
    }

    fn start_experiment(store: &ExperimentStore, weights: (f64, f64)) -> Experiment {
        let experiment = store
            .create_experiment(ExperimentDefinition::new(
                "Test",
                vec![
                    Variant::new("control", weights.0, true),
                    Variant::new("variant_a", weights.1, false),
                ],
            ))
            .expect("create");
        store.start_experiment(&experiment.id).expect("start");
        store.get_experiment(&experiment.id).expect("get")
    }

    /// Assign `users` participants through the public API and convert each
    /// variant's users at the given per-mille rate. Returns per-variant
    /// assigned counts. Assignment is hash-driven, so counts follow the
    /// variant weights.
    fn populate(
        store: &ExperimentStore,
        experiment: &Experiment,
        users: u64,
        conversions_per_mille: HashMap<Uuid, u64>,
    ) -> HashMap<Uuid, u64> {
        let mut assigned: HashMap<Uuid, u64> = HashMap::new();
        for i in 0..users {
            let user = format!("seed-{i}");
            if let Some(variant_id) = store.assign_variant(&experiment.id, &user).expect("assign") {
                let count = assigned.entry(variant_id).or_default();
                let rate = conversions_per_mille.get(&variant_id).copied().unwrap_or(0);
                // convert the first `rate` of every thousand assignments
                if *count % 1000 < rate {
                    store
                        .record_conversion(&experiment.id, &user, "conversion", None)
                        .expect("record");
                }
                *count += 1;
            }
        }
        assigned
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

    #[test]
    fn test_insufficient_data_analysis() {
        let (store, engine) = build_engine(Arc::new(NullMetricsSource));
        let experiment = start_experiment(&store, (50.0, 50.0));

        let analysis = engine.analyze(&experiment.id).expect("analyze");

        assert_eq!(analysis.total_participants, 0);
        assert!(analysis.winner.is_none());
        assert!(!analysis.overall_significance.is_significant);
        assert!(!analysis.recommendations.is_empty());
        assert!(!analysis.next_steps.is_empty());
    }

    #[test]
    fn test_unknown_experiment_errors() {
        let (_store, engine) = build_engine(Arc::new(NullMetricsSource));
        assert!(matches!(
            engine.analyze(&Uuid::new_v4()),
            Err(EngineError::ExperimentNotFound(_))
        ));
    }

    #[test]
    fn test_clear_winner_detected() {
        let (store, engine) = build_engine(Arc::new(NullMetricsSource));
        let experiment = start_experiment(&store, (50.0, 50.0));
        let (control_id, treatment_id) = arm_ids(&experiment);

        // control converts at 5%, treatment at 12%
        let assigned = populate(
            &store,
            &experiment,
            2000,
            HashMap::from([(control_id, 50), (treatment_id, 120)]),
        );

        let analysis = engine.analyze(&experiment.id).expect("analyze");

        assert_eq!(analysis.winner, Some(treatment_id));
        assert_eq!(analysis.loser, Some(control_id));
        assert!(analysis.overall_significance.is_significant);
        assert!(analysis.overall_significance.effect_size > 0.0);
        assert_eq!(
            analysis.total_participants,
            assigned.values().sum::<u64>()
        );
        assert!(!analysis.insights.is_empty());
    }

    #[test]
    fn test_no_winner_when_rates_match() {
        let (store, engine) = build_engine(Arc::new(NullMetricsSource));
        let experiment = start_experiment(&store, (50.0, 50.0));
        let (control_id, treatment_id) = arm_ids(&experiment);

        populate(
            &store,
            &experiment,
            1000,
            HashMap::from([(control_id, 100), (treatment_id, 100)]),
        );

        let analysis = engine.analyze(&experiment.id).expect("analyze");

        assert!(analysis.winner.is_none());
        assert!(analysis.loser.is_none());
        assert!(!analysis.overall_significance.is_significant);
    }

    #[test]
    fn test_heavy_skew_escalates_sample_ratio_anomaly() {
        let (store, engine) = build_engine(Arc::new(NullMetricsSource));
        // 95/5 weights drive an actual split far from the expected 50/50
        let experiment = start_experiment(&store, (95.0, 5.0));
        let (control_id, treatment_id) = arm_ids(&experiment);

        populate(
            &store,
            &experiment,
            2000,
            HashMap::from([(control_id, 50), (treatment_id, 50)]),
        );

        let analysis = engine.analyze(&experiment.id).expect("analyze");

        let mismatches: Vec<_> = analysis
            .anomalies
            .iter()
            .filter(|a| a.kind == AnomalyKind::SampleRatioMismatch)
            .collect();

        assert!(!mismatches.is_empty());
        for anomaly in &mismatches {
            assert!(anomaly.severity >= AnomalySeverity::Medium);
        }
        // ~45-point deviation escalates past the decision gate threshold
        assert!(analysis.severe_anomalies().next().is_some());
    }

    #[test]
    fn test_mild_skew_is_medium_severity() {
        let (store, engine) = build_engine(Arc::new(NullMetricsSource));
        // 65/35: ~15-point deviation, above the 10-point threshold but
        // below the high-severity escalation
        let experiment = start_experiment(&store, (65.0, 35.0));
        let (control_id, treatment_id) = arm_ids(&experiment);

        populate(
            &store,
            &experiment,
            2000,
            HashMap::from([(control_id, 50), (treatment_id, 50)]),
        );

        let analysis = engine.analyze(&experiment.id).expect("analyze");

        let mismatch = analysis
            .anomalies
            .iter()
            .find(|a| a.kind == AnomalyKind::SampleRatioMismatch)
            .expect("anomaly");
        assert_eq!(mismatch.severity, AnomalySeverity::Medium);
        assert!(analysis.severe_anomalies().next().is_none());
    }

    struct DegradedMetrics;

    impl MetricsSource for DegradedMetrics {
        fn performance_snapshot(&self, _experiment_id: &Uuid) -> Option<PerformanceSnapshot> {
            Some(PerformanceSnapshot {
                render_time_ms: 90.0, // 80% over the 50ms ceiling
                interaction_latency_ms: 100.0,
                memory_bytes: 1024.0,
            })
        }
    }

    #[test]
    fn test_performance_degradation_anomaly() {
        let (store, engine) = build_engine(Arc::new(DegradedMetrics));
        let experiment = start_experiment(&store, (50.0, 50.0));
        let (control_id, treatment_id) = arm_ids(&experiment);

        populate(
            &store,
            &experiment,
            400,
            HashMap::from([(control_id, 100), (treatment_id, 120)]),
        );

        let analysis = engine.analyze(&experiment.id).expect("analyze");

        let degradation = analysis
            .anomalies
            .iter()
            .find(|a| a.kind == AnomalyKind::PerformanceDegradation)
            .expect("anomaly");

        // 80% overshoot exceeds the 20% degradation threshold
        assert_eq!(degradation.severity, AnomalySeverity::High);
    }

    #[test]
    fn test_executive_summary() {
        let (store, engine) = build_engine(Arc::new(NullMetricsSource));
        let experiment = start_experiment(&store, (50.0, 50.0));
        let (control_id, treatment_id) = arm_ids(&experiment);

        populate(
            &store,
            &experiment,
            2000,
            HashMap::from([(control_id, 50), (treatment_id, 120)]),
        );

        let summary = engine.executive_summary(&experiment.id).expect("summary");

        assert_eq!(summary.winning_variant, Some(treatment_id));
        // 12% vs 5%: far beyond a 20% relative improvement
        assert!(summary.improvement_rate_pct > 20.0);
        assert_eq!(summary.strategic_value, StrategicValue::High);
        assert!(summary.confidence_level_pct > 95.0);
        assert!(summary.total_participants > 0);
    }
}
