//! Automated decision policy
//!
//! A pure function from analysis + experiment metadata + safety thresholds
//! to a single decision. Rules are evaluated in strict priority order and
//! the first match wins. The policy re-derives its verdict from raw
//! significance and anomaly data only; the analysis' free-text
//! recommendations never drive control flow.
//!
//! Experiment status machine: draft -> scheduled -> running <-> paused ->
//! completed. The engine itself only ever moves running -> paused and
//! running -> completed; cancelled/archived are external actions.

use chrono::{DateTime, Utc};
use serde_json::json;

use ab_automation_config::AutomationConfig;
use ab_automation_types::{ABTestAnalysis, AutomatedDecision, Decision, Experiment};

pub struct DecisionPolicy;

impl DecisionPolicy {
    /// Decide an experiment's fate from its current analysis.
    pub fn decide(
        experiment: &Experiment,
        analysis: &ABTestAnalysis,
        config: &AutomationConfig,
        now: DateTime<Utc>,
    ) -> AutomatedDecision {
        let significance = &analysis.overall_significance;
        let has_winner = analysis.winner.is_some() && significance.is_significant;
        let effect_size = significance.effect_size;
        let duration_days = experiment.duration_days(now);

        let severe: Vec<_> = analysis.severe_anomalies().collect();

        let (decision, reasoning, confidence, mut recommended_actions) = if !severe.is_empty() {
            // Anomaly gate: never let automation act on corrupted data
            let kinds: Vec<_> = severe.iter().map(|a| a.kind.as_str()).collect();
            let mut actions = vec!["Investigate anomalies before proceeding".to_string()];
            for anomaly in &severe {
                actions.extend(anomaly.recommended_actions.iter().cloned());
            }
            (
                Decision::Pause,
                format!("High-severity anomalies detected: {}", kinds.join(", ")),
                0.9,
                actions,
            )
        } else if has_winner && effect_size > config.require_manual_approval_threshold {
            // Large effects must never auto-implement
            (
                Decision::RequireManualReview,
                format!(
                    "Large effect size ({:.3}) requires manual approval before implementation",
                    effect_size
                ),
                0.5,
                vec![
                    "Schedule stakeholder review".to_string(),
                    "Validate results with domain experts".to_string(),
                ],
            )
        } else if has_winner && significance.p_value < (1.0 - config.confidence_threshold) {
            (
                Decision::ImplementWinner,
                format!(
                    "Statistically significant winner detected (p={:.4}, effect={:.3})",
                    significance.p_value, effect_size
                ),
                1.0 - significance.p_value,
                vec![
                    format!(
                        "Implement variant: {}",
                        analysis
                            .winner
                            .map(|id| id.to_string())
                            .unwrap_or_default()
                    ),
                    "Monitor post-implementation metrics".to_string(),
                ],
            )
        } else if significance.p_value > 0.05 && significance.p_value < 0.1 {
            (
                Decision::Continue,
                format!(
                    "Trending towards significance (p={:.4}). Continue collecting data.",
                    significance.p_value
                ),
                0.7,
                vec![
                    "Continue test for more data".to_string(),
                    "Monitor sample size growth".to_string(),
                ],
            )
        } else if duration_days > config.minimum_test_duration_days * 2 && !has_winner {
            (
                Decision::Stop,
                format!("No significant difference after {duration_days} days. Conclude test."),
                0.8,
                vec![
                    "Document learnings".to_string(),
                    "Consider follow-up experiments".to_string(),
                ],
            )
        } else {
            (
                Decision::Continue,
                "Insufficient evidence for decision. Continue testing.".to_string(),
                0.6,
                vec!["Continue data collection".to_string()],
            )
        };

        recommended_actions.dedup();

        AutomatedDecision {
            experiment_id: experiment.id,
            decision,
            reasoning,
            confidence,
            recommended_actions,
            timestamp: now,
            metadata: json!({
                "analysis": {
                    "p_value": significance.p_value,
                    "effect_size": significance.effect_size,
                    "is_significant": significance.is_significant,
                    "winner": analysis.winner,
                },
                "experiment": {
                    "duration_days": duration_days,
                    "participants": analysis.total_participants,
                    "variants": experiment.variants.len(),
                },
            }),
        }
    }
}
