//! Treatment effect estimation with variance-aware confidence bounds
//!
//! One estimate covers one (experiment or segment-cell, metric) pair:
//! effect = mean(treatment) - mean(control), standard error per Welch,
//! degrees of freedom per Welch-Satterthwaite, CI and two-sided p-value from
//! Student's t. Undersized arms and zero-variance data are reported through
//! [`EffectValidity`], never as errors or panics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dataset::ExperimentTable;
use crate::error::{Error, Result};
use crate::stats;

/// Validity of a treatment effect estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectValidity {
    /// Both arms had enough observations and non-degenerate variance
    Ok,
    /// Both arms had zero variance; the CI collapses to the point estimate
    /// and the p-value is undefined
    Degenerate,
    /// Fewer than the minimum observations in an arm; the effect is
    /// undefined and excluded from all downstream aggregation
    Insufficient,
}

/// One treatment effect estimate for a metric.
///
/// `None` fields mean "undefined" per the validity policy, never "zero".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentEffect {
    /// Metric the effect was estimated for
    pub metric: String,
    /// mean(treatment) - mean(control); `None` when insufficient
    pub effect: Option<f64>,
    /// Welch standard error; `None` when insufficient
    pub std_error: Option<f64>,
    /// Lower confidence bound
    pub ci_lower: Option<f64>,
    /// Upper confidence bound
    pub ci_upper: Option<f64>,
    /// Two-sided p-value; `None` when insufficient or degenerate
    pub p_value: Option<f64>,
    /// Welch-Satterthwaite degrees of freedom
    pub dof: Option<f64>,
    /// Treatment arm size
    pub n_treatment: usize,
    /// Control arm size
    pub n_control: usize,
    /// Validity flag
    pub validity: EffectValidity,
}

impl TreatmentEffect {
    /// Whether the estimate is usable for downstream aggregation.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.validity == EffectValidity::Ok
    }

    fn insufficient(metric: &str, n_treatment: usize, n_control: usize) -> Self {
        Self {
            metric: metric.to_string(),
            effect: None,
            std_error: None,
            ci_lower: None,
            ci_upper: None,
            p_value: None,
            dof: None,
            n_treatment,
            n_control,
            validity: EffectValidity::Insufficient,
        }
    }

    fn degenerate(metric: &str, effect: f64, n_treatment: usize, n_control: usize) -> Self {
        Self {
            metric: metric.to_string(),
            effect: Some(effect),
            std_error: Some(0.0),
            ci_lower: Some(effect),
            ci_upper: Some(effect),
            p_value: None,
            dof: None,
            n_treatment,
            n_control,
            validity: EffectValidity::Degenerate,
        }
    }
}

/// Minimum observations per arm for a defined estimate.
pub const MIN_ARM_SIZE: usize = 2;

/// Welch-based treatment effect estimator.
#[derive(Debug, Clone, Copy)]
pub struct TreatmentEffectEstimator {
    alpha: f64,
}

impl Default for TreatmentEffectEstimator {
    fn default() -> Self {
        Self { alpha: 0.05 }
    }
}

impl TreatmentEffectEstimator {
    /// Create an estimator with the given significance level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] unless 0 < `alpha` < 1.
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(Error::Configuration(format!(
                "alpha must be in (0, 1), got {alpha}"
            )));
        }
        Ok(Self { alpha })
    }

    /// Significance level used for confidence intervals.
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Estimate the treatment effect for one metric from raw arm values.
    ///
    /// Never fails: undersized arms return an `Insufficient` estimate and
    /// zero-variance data a `Degenerate` one.
    #[must_use]
    pub fn estimate(&self, metric: &str, treatment: &[f64], control: &[f64]) -> TreatmentEffect {
        let n_t = treatment.len();
        let n_c = control.len();
        if n_t < MIN_ARM_SIZE || n_c < MIN_ARM_SIZE {
            return TreatmentEffect::insufficient(metric, n_t, n_c);
        }

        let effect = stats::mean(treatment) - stats::mean(control);
        let var_t = stats::sample_variance(treatment);
        let var_c = stats::sample_variance(control);
        let se = stats::welch_standard_error(var_t, n_t, var_c, n_c);

        if se <= f64::EPSILON {
            return TreatmentEffect::degenerate(metric, effect, n_t, n_c);
        }

        let Some(dof) = stats::welch_satterthwaite_dof(var_t, n_t, var_c, n_c) else {
            return TreatmentEffect::degenerate(metric, effect, n_t, n_c);
        };
        let Some(t_crit) = stats::t_critical(dof, self.alpha) else {
            return TreatmentEffect::degenerate(metric, effect, n_t, n_c);
        };

        let t_statistic = effect / se;
        TreatmentEffect {
            metric: metric.to_string(),
            effect: Some(effect),
            std_error: Some(se),
            ci_lower: Some(effect - t_crit * se),
            ci_upper: Some(effect + t_crit * se),
            p_value: stats::two_sided_t_p_value(t_statistic, dof),
            dof: Some(dof),
            n_treatment: n_t,
            n_control: n_c,
            validity: EffectValidity::Ok,
        }
    }

    /// Per-experiment effects for one metric over a table, keyed by
    /// experiment id. Only experiments with both arms present participate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the metric is not a table column.
    pub fn estimate_by_experiment(
        &self,
        table: &ExperimentTable,
        metric: &str,
    ) -> Result<BTreeMap<String, TreatmentEffect>> {
        if !table.has_metric(metric) {
            return Err(Error::InvalidInput(format!(
                "metric '{metric}' is not a column of the table"
            )));
        }

        let mut effects = BTreeMap::new();
        for id in table.valid_experiment_ids() {
            let (t, c) = table.arm_values(id, metric);
            effects.insert(id.to_string(), self.estimate(metric, &t, &c));
        }
        Ok(effects)
    }
}
