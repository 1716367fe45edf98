//! Ship/no-ship decision simulation
//!
//! Replays every experiment as a shipping decision taken from a proxy's
//! treatment effect and grades it against the oracle (the decision-maker
//! that sees the true long-horizon effect). The oracle itself is always
//! simulated as a pseudo-proxy and must score win_rate = 1.0 with zero
//! regret; this invariant doubles as a built-in self-test.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::ExperimentTable;
use crate::error::{Error, Result};
use crate::estimator::{TreatmentEffect, TreatmentEffectEstimator};

/// Name of the mandatory oracle baseline row.
pub const ORACLE_NAME: &str = "oracle";

/// Configuration for decision simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Long-horizon outcome metric column
    pub outcome_metric: String,
    /// Shipping threshold: SHIP when proxy effect exceeds it
    pub threshold: f64,
}

impl DecisionConfig {
    /// Create a config with the default threshold of 0.
    #[must_use]
    pub fn new(outcome_metric: impl Into<String>) -> Self {
        Self {
            outcome_metric: outcome_metric.into(),
            threshold: 0.0,
        }
    }

    /// Replace the shipping threshold.
    #[must_use]
    pub const fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    fn validate(&self, table: &ExperimentTable) -> Result<()> {
        if !self.threshold.is_finite() {
            return Err(Error::Configuration(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        if !table.has_metric(&self.outcome_metric) {
            return Err(Error::InvalidInput(format!(
                "outcome metric '{}' is not a column of the table",
                self.outcome_metric
            )));
        }
        Ok(())
    }
}

/// Decision quality of one proxy (or the oracle) across all experiments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSimResult {
    /// Proxy metric name, or [`ORACLE_NAME`]
    pub metric: String,
    /// Experiments with valid effects on both sides
    pub n_experiments: usize,
    /// Shipped and the outcome was truly positive (TP)
    pub correct_ships: usize,
    /// Held back and the outcome was truly non-positive (TN)
    pub correct_holds: usize,
    /// Shipped a truly non-positive experiment (FP)
    pub incorrect_ships: usize,
    /// Held back a truly positive experiment (FN)
    pub missed_opportunities: usize,
    /// Total SHIP decisions taken
    pub total_shipped: usize,
    /// (TP + TN) / total
    pub win_rate: f64,
    /// FP / (FP + TN); `None` when no truly non-positive experiments exist
    pub false_positive_rate: Option<f64>,
    /// FN / (FN + TP); `None` when no truly positive experiments exist
    pub false_negative_rate: Option<f64>,
    /// Mean |outcome effect| over experiments where the proxy and oracle
    /// decisions diverge
    pub avg_regret: f64,
}

/// Simulate shipping decisions for each metric, plus the oracle baseline.
///
/// Metrics with zero valid experiment pairs are omitted (with a warning)
/// rather than reported as an empty 2x2 classification. Results are sorted
/// by descending win rate, then ascending regret, then metric name.
///
/// # Errors
///
/// Returns [`Error::Configuration`] for a non-finite threshold and
/// [`Error::InvalidInput`] for an empty metric list or unknown columns.
pub fn simulate_decisions(
    table: &ExperimentTable,
    metrics: &[&str],
    config: &DecisionConfig,
) -> Result<Vec<DecisionSimResult>> {
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
        threshold = config.threshold,
        "simulating shipping decisions"
    );

    let estimator = TreatmentEffectEstimator::default();
    let outcome_effects = estimator.estimate_by_experiment(table, &config.outcome_metric)?;

    let mut results = Vec::with_capacity(metrics.len() + 1);
    for metric in metrics {
        let proxy_effects = estimator.estimate_by_experiment(table, metric)?;
        let pairs: Vec<(f64, f64)> = proxy_effects
            .iter()
            .filter_map(|(id, proxy)| {
                let outcome = outcome_effects.get(id)?;
                Some((ok_effect(proxy)?, ok_effect(outcome)?))
            })
            .collect();

        if pairs.is_empty() {
            warn!(metric, "no valid experiment pairs; omitting from simulation");
            continue;
        }
        results.push(classify(metric, &pairs, config.threshold));
    }

    // Oracle pseudo-proxy: the outcome stands in for the proxy, judged at
    // threshold 0 (its own decision rule), so win_rate = 1.0 holds for any
    // caller threshold
    let oracle_pairs: Vec<(f64, f64)> = outcome_effects
        .values()
        .filter_map(|outcome| {
            let effect = ok_effect(outcome)?;
            Some((effect, effect))
        })
        .collect();
    if oracle_pairs.is_empty() {
        warn!("no valid outcome effects; oracle baseline is empty");
    } else {
        results.push(classify(ORACLE_NAME, &oracle_pairs, 0.0));
    }

    results.sort_by(|a, b| {
        b.win_rate
            .partial_cmp(&a.win_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.avg_regret
                    .partial_cmp(&b.avg_regret)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.metric.cmp(&b.metric))
    });
    Ok(results)
}

fn ok_effect(effect: &TreatmentEffect) -> Option<f64> {
    effect.is_ok().then_some(effect.effect).flatten()
}

#[allow(clippy::cast_precision_loss)]
fn classify(metric: &str, pairs: &[(f64, f64)], threshold: f64) -> DecisionSimResult {
    let mut tp = 0usize;
    let mut tn = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;
    let mut regret = 0.0;

    for &(proxy_effect, outcome_effect) in pairs {
        let ship = proxy_effect > threshold;
        let oracle_ships = outcome_effect > 0.0;
        match (ship, oracle_ships) {
            (true, true) => tp += 1,
            (false, false) => tn += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
        }
        if ship != oracle_ships {
            regret += outcome_effect.abs();
        }
    }

    let total = pairs.len();
    let ratio = |num: usize, denom: usize| {
        (denom > 0).then(|| num as f64 / denom as f64)
    };

    DecisionSimResult {
        metric: metric.to_string(),
        n_experiments: total,
        correct_ships: tp,
        correct_holds: tn,
        incorrect_ships: fp,
        missed_opportunities: fn_,
        total_shipped: tp + fp,
        win_rate: (tp + tn) as f64 / total as f64,
        false_positive_rate: ratio(fp, fp + tn),
        false_negative_rate: ratio(fn_, fn_ + tp),
        avg_regret: regret / total as f64,
    }
}
