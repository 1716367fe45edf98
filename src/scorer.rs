//! Proxy reliability scoring
//!
//! Scores each candidate proxy metric as a predictor of the long-horizon
//! outcome, combining three components over per-experiment effects:
//!
//! - effect correlation (Pearson, Fisher-z significance)
//! - directional accuracy (sign agreement, exact zeros excluded)
//! - segment fragility (mean flip rate from the fragility detector)
//!
//! Composite: R = w1 * (rho + 1) / 2 + w2 * alpha + w3 * (1 - phi), so
//! R is always in [0, 1]. Ranking is fully deterministic, including
//! tie-breaks, so two calls over the same table are bit-identical.

use chrono::{DateTime, Utc};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::ExperimentTable;
use crate::error::{Error, Result};
use crate::estimator::{TreatmentEffect, TreatmentEffectEstimator};
use crate::fragility::{find_fragile_segments, FragilityConfig};
use crate::stats;

/// Weights of the composite reliability score. Must be non-negative and
/// sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of the normalized effect correlation
    pub correlation: f64,
    /// Weight of the directional accuracy
    pub directional: f64,
    /// Weight of (1 - fragility rate)
    pub fragility: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            correlation: 0.6,
            directional: 0.2,
            fragility: 0.2,
        }
    }
}

impl ScoringWeights {
    /// Validate the weights.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when a weight is negative or the
    /// weights do not sum to 1 (within 1e-9).
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("correlation", self.correlation),
            ("directional", self.directional),
            ("fragility", self.fragility),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::Configuration(format!(
                    "weight '{name}' must be finite and non-negative, got {w}"
                )));
            }
        }
        let sum = self.correlation + self.directional + self.fragility;
        if (sum - 1.0).abs() > 1e-9 {
            return Err(Error::Configuration(format!(
                "weights must sum to 1, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Configuration for proxy scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Long-horizon outcome metric column
    pub outcome_metric: String,
    /// Composite weights
    pub weights: ScoringWeights,
    /// Minimum valid (proxy, outcome) experiment pairs to enter the ranking
    pub min_experiments: usize,
    /// Fragility settings for the phi component
    pub fragility: FragilityConfig,
}

impl ScoringConfig {
    /// Create a config with default weights and a minimum of 3 experiments.
    #[must_use]
    pub fn new(outcome_metric: impl Into<String>, segment_keys: Vec<String>) -> Self {
        Self {
            outcome_metric: outcome_metric.into(),
            weights: ScoringWeights::default(),
            min_experiments: 3,
            fragility: FragilityConfig::new(segment_keys),
        }
    }

    /// Replace the composite weights.
    #[must_use]
    pub const fn weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Replace the experiment-pair minimum.
    #[must_use]
    pub const fn min_experiments(mut self, min_experiments: usize) -> Self {
        self.min_experiments = min_experiments;
        self
    }

    fn validate(&self, table: &ExperimentTable) -> Result<()> {
        self.weights.validate()?;
        if self.min_experiments == 0 {
            return Err(Error::Configuration(
                "min_experiments must be at least 1".to_string(),
            ));
        }
        self.fragility.validate(table)?;
        if !table.has_metric(&self.outcome_metric) {
            return Err(Error::InvalidInput(format!(
                "outcome metric '{}' is not a column of the table",
                self.outcome_metric
            )));
        }
        Ok(())
    }
}

/// One ranked proxy reliability score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyReliabilityScore {
    /// Proxy metric name
    pub metric: String,
    /// Composite reliability R in [0, 1]
    pub composite: f64,
    /// Raw Pearson correlation of (proxy, outcome) effects
    pub correlation: f64,
    /// Fisher-z two-sided significance of the correlation
    pub correlation_p_value: Option<f64>,
    /// True when the correlation was undefined (zero effect variance) and
    /// contributed neutrally to the composite
    pub correlation_degenerate: bool,
    /// Fraction of experiments whose effects agree in sign
    pub directional_accuracy: f64,
    /// Mean flip rate across qualifying segments
    pub fragility_rate: f64,
    /// False when no segment had enough evidence, making the fragility
    /// component vacuous
    pub fragility_evidence: bool,
    /// Valid experiment pairs actually used
    pub n_experiments: usize,
    /// 1-based rank (descending composite)
    pub rank: usize,
}

/// A proxy excluded from the ranking for lack of data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientProxy {
    /// Proxy metric name
    pub metric: String,
    /// Valid experiment pairs found (below the minimum, or zero usable
    /// sign pairs)
    pub n_experiments: usize,
}

/// Diagnostics attached to every scoring report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDiagnostics {
    /// When the report was computed
    pub computed_at: DateTime<Utc>,
    /// Rows in the input table
    pub n_rows: usize,
    /// Distinct experiments in the table
    pub n_experiments: usize,
    /// Experiments with both arms present
    pub n_valid_experiments: usize,
    /// Outcome metric scored against
    pub outcome_metric: String,
    /// Weights used for the composite
    pub weights: ScoringWeights,
}

/// Full result of [`score_proxies`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyScoreReport {
    /// Ranked scores, best first
    pub scores: Vec<ProxyReliabilityScore>,
    /// Proxies excluded for insufficient data (never silently scored 0)
    pub insufficient: Vec<InsufficientProxy>,
    /// Run diagnostics
    pub diagnostics: ScoreDiagnostics,
}

enum ProxyVerdict {
    Scored(ProxyReliabilityScore),
    Insufficient(InsufficientProxy),
}

/// Score each candidate proxy metric against the configured outcome.
///
/// Proxies with fewer than `min_experiments` valid pairs are reported under
/// `insufficient` rather than ranked. Ranking order is descending composite,
/// ties broken by higher directional accuracy, then metric name.
///
/// # Errors
///
/// Returns [`Error::Configuration`] for invalid weights or minimums and
/// [`Error::InvalidInput`] for an empty metric list or unknown columns.
pub fn score_proxies(
    table: &ExperimentTable,
    metrics: &[&str],
    config: &ScoringConfig,
) -> Result<ProxyScoreReport> {
    config.validate(table)?;
    if metrics.is_empty() {
        return Err(Error::InvalidInput(
            "at least one proxy metric is required".to_string(),
        ));
    }
    for metric in metrics {
        if !table.has_metric(metric) {
            return Err(Error::InvalidInput(format!(
                "metric '{metric}' is not a column of the table"
            )));
        }
    }

    info!(
        proxies = metrics.len(),
        outcome = %config.outcome_metric,
        rows = table.num_rows(),
        "scoring proxies"
    );

    let estimator = TreatmentEffectEstimator::default();
    let outcome_effects = estimator.estimate_by_experiment(table, &config.outcome_metric)?;

    let score_one = |metric: &&str| -> Result<ProxyVerdict> {
        score_proxy(table, metric, &outcome_effects, config, estimator)
    };

    #[cfg(feature = "rayon")]
    let verdicts: Vec<Result<ProxyVerdict>> = metrics.par_iter().map(score_one).collect();
    #[cfg(not(feature = "rayon"))]
    let verdicts: Vec<Result<ProxyVerdict>> = metrics.iter().map(score_one).collect();

    let mut scores = Vec::new();
    let mut insufficient = Vec::new();
    for verdict in verdicts {
        match verdict? {
            ProxyVerdict::Scored(score) => scores.push(score),
            ProxyVerdict::Insufficient(proxy) => insufficient.push(proxy),
        }
    }

    // Deterministic ranking: composite desc, directional accuracy desc,
    // metric name asc
    scores.sort_by(|a, b| {
        b.composite
            .partial_cmp(&a.composite)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.directional_accuracy
                    .partial_cmp(&a.directional_accuracy)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.metric.cmp(&b.metric))
    });
    for (i, score) in scores.iter_mut().enumerate() {
        score.rank = i + 1;
    }
    insufficient.sort_by(|a, b| a.metric.cmp(&b.metric));

    Ok(ProxyScoreReport {
        scores,
        insufficient,
        diagnostics: ScoreDiagnostics {
            computed_at: Utc::now(),
            n_rows: table.num_rows(),
            n_experiments: table.experiment_ids().len(),
            n_valid_experiments: table.valid_experiment_ids().len(),
            outcome_metric: config.outcome_metric.clone(),
            weights: config.weights,
        },
    })
}

#[allow(clippy::cast_precision_loss)]
fn score_proxy(
    table: &ExperimentTable,
    metric: &str,
    outcome_effects: &std::collections::BTreeMap<String, TreatmentEffect>,
    config: &ScoringConfig,
    estimator: TreatmentEffectEstimator,
) -> Result<ProxyVerdict> {
    let proxy_effects = estimator.estimate_by_experiment(table, metric)?;

    // Pairs where both sides estimated cleanly
    let mut proxy_series = Vec::new();
    let mut outcome_series = Vec::new();
    for (id, proxy) in &proxy_effects {
        let Some(outcome) = outcome_effects.get(id) else {
            continue;
        };
        if let (Some(p), Some(o)) = (
            proxy.is_ok().then_some(proxy.effect).flatten(),
            outcome.is_ok().then_some(outcome.effect).flatten(),
        ) {
            proxy_series.push(p);
            outcome_series.push(o);
        }
    }

    let n = proxy_series.len();
    if n < config.min_experiments {
        debug!(metric, pairs = n, "proxy excluded: too few valid pairs");
        return Ok(ProxyVerdict::Insufficient(InsufficientProxy {
            metric: metric.to_string(),
            n_experiments: n,
        }));
    }

    // Directional accuracy: exact zeros make no claim and are excluded
    // from both numerator and denominator
    let sign_pairs: Vec<(f64, f64)> = proxy_series
        .iter()
        .zip(outcome_series.iter())
        .filter(|(p, o)| **p != 0.0 && **o != 0.0)
        .map(|(p, o)| (*p, *o))
        .collect();
    if sign_pairs.is_empty() {
        debug!(metric, "proxy excluded: no non-zero effect pairs");
        return Ok(ProxyVerdict::Insufficient(InsufficientProxy {
            metric: metric.to_string(),
            n_experiments: n,
        }));
    }
    let matches = sign_pairs.iter().filter(|(p, o)| p * o > 0.0).count();
    let directional_accuracy = matches as f64 / sign_pairs.len() as f64;

    let correlation = stats::pearson_correlation(&proxy_series, &outcome_series);
    let correlation_degenerate = correlation.is_none();
    let rho = correlation.unwrap_or(0.0);
    let correlation_p_value = correlation.and_then(|r| stats::fisher_z_p_value(r, n));

    let segments = find_fragile_segments(table, metric, &config.outcome_metric, &config.fragility)?;
    let fragility_evidence = !segments.is_empty();
    let fragility_rate = if fragility_evidence {
        segments.iter().map(|s| s.flip_rate).sum::<f64>() / segments.len() as f64
    } else {
        0.0
    };

    let rho01 = (rho + 1.0) / 2.0;
    let composite = (config.weights.correlation * rho01
        + config.weights.directional * directional_accuracy
        + config.weights.fragility * (1.0 - fragility_rate))
        .clamp(0.0, 1.0);

    Ok(ProxyVerdict::Scored(ProxyReliabilityScore {
        metric: metric.to_string(),
        composite,
        correlation: rho,
        correlation_p_value,
        correlation_degenerate,
        directional_accuracy,
        fragility_rate,
        fragility_evidence,
        n_experiments: n,
        rank: 0,
    }))
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_are_valid() {
        assert!(ScoringWeights::default().validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights = ScoringWeights {
            correlation: 0.5,
            directional: 0.2,
            fragility: 0.2,
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = ScoringWeights {
            correlation: 1.2,
            directional: -0.1,
            fragility: -0.1,
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_weights_serde_round_trip() {
        let weights = ScoringWeights::default();
        let json = serde_json::to_string(&weights).unwrap();
        let back: ScoringWeights = serde_json::from_str(&json).unwrap();
        assert_eq!(weights, back);
    }
}
