//! Statistical test suite shared by the estimation and scoring modules
//!
//! Provides the numeric primitives the rest of the crate builds on:
//! - Welch's t-test with Welch-Satterthwaite degrees of freedom
//! - Pearson correlation with Fisher z-transform significance
//! - Percentile bootstrap confidence intervals (seeded, reproducible)
//!
//! All functions are pure and return `Option` for conditions where the
//! statistic is undefined (zero variance, undersized samples) rather than
//! dividing by zero.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Mean of a sample; 0.0 for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Unbiased sample variance (n-1 denominator); 0.0 for fewer than 2 samples.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sample_variance(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let m = mean(samples);
    samples.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (samples.len() - 1) as f64
}

/// Welch standard error of the difference in means:
/// SE = sqrt(`var_t`/`n_t` + `var_c`/`n_c`).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn welch_standard_error(var_t: f64, n_t: usize, var_c: f64, n_c: usize) -> f64 {
    (var_t / n_t as f64 + var_c / n_c as f64).sqrt()
}

/// Welch-Satterthwaite degrees of freedom.
///
/// Returns `None` when both variances are zero (the ratio is undefined).
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::suboptimal_flops)]
pub fn welch_satterthwaite_dof(var_t: f64, n_t: usize, var_c: f64, n_c: usize) -> Option<f64> {
    let (n_t, n_c) = (n_t as f64, n_c as f64);
    let num = (var_t / n_t + var_c / n_c).powi(2);
    let denom = (var_t / n_t).powi(2) / (n_t - 1.0) + (var_c / n_c).powi(2) / (n_c - 1.0);
    if denom <= f64::EPSILON {
        None
    } else {
        Some(num / denom)
    }
}

/// Two-sided p-value for a t-statistic under Student's t with `dof` degrees
/// of freedom. `None` when the distribution cannot be constructed (dof <= 0).
#[must_use]
pub fn two_sided_t_p_value(t_statistic: f64, dof: f64) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, dof).ok()?;
    Some(2.0 * (1.0 - dist.cdf(t_statistic.abs())))
}

/// Critical t value for a two-sided interval at significance `alpha`.
#[must_use]
pub fn t_critical(dof: f64, alpha: f64) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, dof).ok()?;
    Some(dist.inverse_cdf(1.0 - alpha / 2.0))
}

/// Pearson correlation coefficient between two equal-length series.
///
/// Returns `None` when fewer than 2 pairs are available or either series
/// has (near-)zero variance, where the coefficient is undefined.
#[must_use]
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x);
    let my = mean(y);
    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        let dx = a - mx;
        let dy = b - my;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    let denom = (sxx * syy).sqrt();
    if denom <= f64::EPSILON {
        None
    } else {
        Some(sxy / denom)
    }
}

/// Two-sided significance of a Pearson correlation via the Fisher
/// z-transform: z = atanh(rho) * sqrt(n - 3).
///
/// `None` when n < 4 or |rho| = 1, where the transform diverges.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fisher_z_p_value(rho: f64, n: usize) -> Option<f64> {
    if n < 4 || rho.abs() >= 1.0 {
        return None;
    }
    let z = rho.atanh() * ((n - 3) as f64).sqrt();
    let normal = Normal::new(0.0, 1.0).ok()?;
    Some(2.0 * (1.0 - normal.cdf(z.abs())))
}

/// Bootstrap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Number of bootstrap resamples
    pub resamples: usize,
    /// Confidence level (e.g. 0.95)
    pub confidence: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            resamples: 1000,
            confidence: 0.95,
            seed: 42,
        }
    }
}

/// Percentile bootstrap interval for a difference in means
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BootstrapInterval {
    /// Observed effect (difference in means)
    pub effect: f64,
    /// Lower percentile bound
    pub ci_lower: f64,
    /// Upper percentile bound
    pub ci_upper: f64,
}

/// Percentile bootstrap CI for mean(treatment) - mean(control).
///
/// Resamples each arm with replacement using a seeded `ChaCha8Rng`, so two
/// calls with the same config produce identical intervals.
///
/// Returns `None` when either arm is empty or `resamples` is zero.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]
pub fn bootstrap_effect_ci(
    treatment: &[f64],
    control: &[f64],
    config: &BootstrapConfig,
) -> Option<BootstrapInterval> {
    if treatment.is_empty() || control.is_empty() || config.resamples == 0 {
        return None;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut effects = Vec::with_capacity(config.resamples);

    for _ in 0..config.resamples {
        let t_sum: f64 = (0..treatment.len())
            .map(|_| treatment[rng.gen_range(0..treatment.len())])
            .sum();
        let c_sum: f64 = (0..control.len())
            .map(|_| control[rng.gen_range(0..control.len())])
            .sum();
        effects.push(t_sum / treatment.len() as f64 - c_sum / control.len() as f64);
    }

    effects.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let alpha = 1.0 - config.confidence;
    let lower_idx = (config.resamples as f64 * (alpha / 2.0)).floor() as usize;
    let upper_idx = (config.resamples as f64 * (1.0 - alpha / 2.0)).ceil() as usize;

    let ci_lower = effects.get(lower_idx).copied()?;
    let ci_upper = effects.get(upper_idx.min(effects.len() - 1)).copied()?;

    Some(BootstrapInterval {
        effect: mean(treatment) - mean(control),
        ci_lower,
        ci_upper,
    })
}
