//! Statistical significance testing for A/B experiments
//!
//! Pure, deterministic calculations: two-proportion z-test, Wilson score
//! confidence interval, and required sample size. All functions reject
//! degenerate inputs instead of silently returning NaN.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::errors::{EngineError, Result};
use ab_automation_types::{ConfidenceInterval, SignificanceResult};

/// Two-proportion z-test for comparing conversion rates
///
/// Tests the null hypothesis that two proportions are equal. Group 1 is
/// conventionally the control arm, group 2 the treatment.
#[derive(Debug, Clone)]
pub struct ZTest {
    /// Successes in group 1
    pub successes_1: u64,
    /// Total trials in group 1
    pub trials_1: u64,
    /// Successes in group 2
    pub successes_2: u64,
    /// Total trials in group 2
    pub trials_2: u64,
}

impl ZTest {
    /// Create a new z-test
    pub fn new(successes_1: u64, trials_1: u64, successes_2: u64, trials_2: u64) -> Self {
        Self {
            successes_1,
            trials_1,
            successes_2,
            trials_2,
        }
    }

    /// Sample proportions for both groups
    pub fn proportions(&self) -> (f64, f64) {
        let p1 = if self.trials_1 > 0 {
            self.successes_1 as f64 / self.trials_1 as f64
        } else {
            0.0
        };

        let p2 = if self.trials_2 > 0 {
            self.successes_2 as f64 / self.trials_2 as f64
        } else {
            0.0
        };

        (p1, p2)
    }

    /// Pooled proportion across both groups
    pub fn pooled_proportion(&self) -> f64 {
        let total_successes = self.successes_1 + self.successes_2;
        let total_trials = self.trials_1 + self.trials_2;

        if total_trials > 0 {
            total_successes as f64 / total_trials as f64
        } else {
            0.0
        }
    }

    fn check_samples(&self) -> Result<()> {
        if self.trials_1 == 0 || self.trials_2 == 0 {
            return Err(EngineError::InvalidSampleSize(
                "cannot perform z-test with zero trials".to_string(),
            ));
        }
        if self.successes_1 > self.trials_1 || self.successes_2 > self.trials_2 {
            return Err(EngineError::InvalidParameters(
                "successes cannot exceed trials".to_string(),
            ));
        }
        Ok(())
    }

    /// Z-statistic under the pooled null hypothesis.
    ///
    /// Returns 0.0 when the pooled standard error degenerates (all
    /// successes or all failures in both arms).
    pub fn z_statistic(&self) -> Result<f64> {
        self.check_samples()?;

        let (p1, p2) = self.proportions();
        let p_pool = self.pooled_proportion();

        let n1 = self.trials_1 as f64;
        let n2 = self.trials_2 as f64;

        let se = (p_pool * (1.0 - p_pool) * (1.0 / n1 + 1.0 / n2)).sqrt();
        if se == 0.0 {
            return Ok(0.0);
        }

        Ok((p1 - p2) / se)
    }

    /// Standardized effect size: |p1 - p2| / sqrt(pooled_p * (1 - pooled_p))
    pub fn effect_size(&self) -> f64 {
        let (p1, p2) = self.proportions();
        let p_pool = self.pooled_proportion();

        let denom = (p_pool * (1.0 - p_pool)).sqrt();
        if denom == 0.0 {
            return 0.0;
        }

        (p1 - p2).abs() / denom
    }

    /// Perform the two-tailed test at the given alpha level
    pub fn two_sample(&self, alpha: f64) -> Result<SignificanceResult> {
        if alpha <= 0.0 || alpha >= 1.0 {
            return Err(EngineError::InvalidParameters(
                "alpha must be in (0, 1)".to_string(),
            ));
        }

        let z = self.z_statistic()?;

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| EngineError::InvalidParameters(e.to_string()))?;

        let p_value = 2.0 * (1.0 - normal.cdf(z.abs()));
        let critical = normal.inverse_cdf(1.0 - alpha / 2.0);

        Ok(SignificanceResult {
            is_significant: z.abs() > critical,
            p_value,
            z_score: z,
            effect_size: self.effect_size(),
            method: "two_sample_z_test".to_string(),
        })
    }
}

/// Wilson score interval for a binomial proportion.
///
/// Chosen over the normal approximation for small-sample accuracy; bounds
/// are clamped to [0, 1].
pub fn wilson_interval(trials: u64, successes: u64, level: f64) -> Result<ConfidenceInterval> {
    if trials == 0 {
        return Err(EngineError::InvalidSampleSize(
            "cannot compute confidence interval with zero trials".to_string(),
        ));
    }
    if successes > trials {
        return Err(EngineError::InvalidParameters(
            "successes cannot exceed trials".to_string(),
        ));
    }
    if level <= 0.0 || level >= 1.0 {
        return Err(EngineError::InvalidParameters(
            "confidence level must be in (0, 1)".to_string(),
        ));
    }

    let normal =
        Normal::new(0.0, 1.0).map_err(|e| EngineError::InvalidParameters(e.to_string()))?;
    let alpha = 1.0 - level;
    let z = normal.inverse_cdf(1.0 - alpha / 2.0);

    let n = trials as f64;
    let p = successes as f64 / n;

    let denominator = 1.0 + (z * z) / n;
    let centre = (p + (z * z) / (2.0 * n)) / denominator;
    let margin = (z / denominator) * ((p * (1.0 - p)) / n + (z * z) / (4.0 * n * n)).sqrt();

    Ok(ConfidenceInterval {
        level,
        lower: (centre - margin).max(0.0),
        upper: (centre + margin).min(1.0),
        margin,
    })
}

/// Sample size calculator for two-proportion A/B tests
pub struct SampleSizeCalculator {
    /// Baseline conversion rate
    pub baseline_rate: f64,
    /// Minimum detectable effect (relative improvement)
    pub min_detectable_effect: f64,
    /// Statistical power (1 - beta)
    pub power: f64,
    /// Significance level (alpha)
    pub alpha: f64,
}

impl SampleSizeCalculator {
    /// Create a new calculator, rejecting out-of-range parameters
    pub fn new(baseline_rate: f64, min_detectable_effect: f64, power: f64, alpha: f64) -> Result<Self> {
        if baseline_rate <= 0.0 || baseline_rate >= 1.0 {
            return Err(EngineError::InvalidParameters(
                "baseline rate must be between 0 and 1".to_string(),
            ));
        }

        if min_detectable_effect <= 0.0 {
            return Err(EngineError::InvalidParameters(
                "minimum detectable effect must be positive".to_string(),
            ));
        }

        if power <= 0.0 || power >= 1.0 {
            return Err(EngineError::InvalidParameters(
                "power must be between 0 and 1".to_string(),
            ));
        }

        if alpha <= 0.0 || alpha >= 1.0 {
            return Err(EngineError::InvalidParameters(
                "alpha must be between 0 and 1".to_string(),
            ));
        }

        Ok(Self {
            baseline_rate,
            min_detectable_effect,
            power,
            alpha,
        })
    }

    /// Required sample size per variant
    pub fn calculate(&self) -> Result<u64> {
        let p1 = self.baseline_rate;
        let p2 = self.baseline_rate * (1.0 + self.min_detectable_effect);

        if p2 >= 1.0 {
            return Err(EngineError::InvalidParameters(
                "effect size too large, treatment rate exceeds 1.0".to_string(),
            ));
        }

        let normal =
            Normal::new(0.0, 1.0).map_err(|e| EngineError::InvalidParameters(e.to_string()))?;

        let z_alpha = normal.inverse_cdf(1.0 - self.alpha / 2.0);
        let z_beta = normal.inverse_cdf(self.power);

        let p_avg = (p1 + p2) / 2.0;
        let delta = (p2 - p1).abs();

        let numerator = (z_alpha * (2.0 * p_avg * (1.0 - p_avg)).sqrt()
            + z_beta * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt())
        .powi(2);

        Ok((numerator / delta.powi(2)).ceil() as u64)
    }
}
