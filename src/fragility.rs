//! Segment-level fragility (sign-flip) detection
//!
//! A segment is fragile for a proxy when, within its (experiment, segment)
//! cells, the proxy's treatment effect points the opposite way from the
//! long-horizon outcome effect. Cells below the sample minimum are excluded
//! entirely: "insufficient evidence" is a third state, distinct from
//! "0% fragile".

use std::collections::BTreeMap;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{ExperimentTable, SegmentCell};
use crate::error::{Error, Result};
use crate::estimator::TreatmentEffectEstimator;

/// Configuration for fragility detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragilityConfig {
    /// Segment attributes defining the cells (one or more)
    pub segment_keys: Vec<String>,
    /// Minimum observations required in each arm of a cell
    pub min_count: usize,
    /// Materiality floor: |outcome effect| must exceed this for a flip
    pub materiality: f64,
}

impl FragilityConfig {
    /// Create a config with the default `min_count` (500) and
    /// materiality floor (0.01).
    #[must_use]
    pub fn new(segment_keys: Vec<String>) -> Self {
        Self {
            segment_keys,
            min_count: 500,
            materiality: 0.01,
        }
    }

    /// Set the per-arm cell sample minimum.
    #[must_use]
    pub const fn min_count(mut self, min_count: usize) -> Self {
        self.min_count = min_count;
        self
    }

    /// Set the materiality floor for outcome effects.
    #[must_use]
    pub const fn materiality(mut self, materiality: f64) -> Self {
        self.materiality = materiality;
        self
    }

    /// Validate the config against a table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for empty segment keys, a sample
    /// minimum below 2, or a non-finite/negative materiality floor, and
    /// [`Error::InvalidInput`] for segment keys the table does not carry.
    pub fn validate(&self, table: &ExperimentTable) -> Result<()> {
        if self.segment_keys.is_empty() {
            return Err(Error::Configuration(
                "at least one segment key is required".to_string(),
            ));
        }
        if self.min_count < 2 {
            return Err(Error::Configuration(format!(
                "min_count must be at least 2, got {}",
                self.min_count
            )));
        }
        if !self.materiality.is_finite() || self.materiality < 0.0 {
            return Err(Error::Configuration(format!(
                "materiality must be finite and non-negative, got {}",
                self.materiality
            )));
        }
        for key in &self.segment_keys {
            if !table.has_segment(key) {
                return Err(Error::InvalidInput(format!(
                    "segment key '{key}' is not a column of the table"
                )));
            }
        }
        Ok(())
    }
}

/// One ranked fragile segment value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragileSegment {
    /// Segment attribute values (key -> value)
    pub segment: BTreeMap<String, String>,
    /// flips / qualifying cells
    pub flip_rate: f64,
    /// Number of qualifying (experiment, segment) cells
    pub n_cells: usize,
    /// Mean total observations per qualifying cell
    pub avg_cell_size: f64,
    /// 1-based rank (descending flip rate)
    pub rank: usize,
}

/// Outcome of evaluating one cell against the flip rule.
#[derive(Debug, Clone, Copy)]
struct CellVerdict {
    flipped: bool,
    n_total: usize,
}

/// Rank segment values by how often the proxy's cell-level effect direction
/// contradicts the outcome's.
///
/// A cell qualifies when both arms hold at least `min_count` observations and
/// both effects estimate cleanly; it counts as a flip when the effects have
/// strictly opposite signs and |outcome effect| exceeds the materiality
/// floor. Segments with zero qualifying cells are excluded from the result.
///
/// Ranking is deterministic: descending flip rate, ties broken by more cells
/// (more evidence), then by segment value.
///
/// # Errors
///
/// Returns [`Error::Configuration`] / [`Error::InvalidInput`] for an invalid
/// config or unknown metric names.
pub fn find_fragile_segments(
    table: &ExperimentTable,
    proxy_metric: &str,
    outcome_metric: &str,
    config: &FragilityConfig,
) -> Result<Vec<FragileSegment>> {
    config.validate(table)?;
    for metric in [proxy_metric, outcome_metric] {
        if !table.has_metric(metric) {
            return Err(Error::InvalidInput(format!(
                "metric '{metric}' is not a column of the table"
            )));
        }
    }

    let estimator = TreatmentEffectEstimator::default();
    let cells = table.segment_cells(&config.segment_keys);
    info!(
        proxy = proxy_metric,
        outcome = outcome_metric,
        cells = cells.len(),
        "detecting fragile segments"
    );

    let judge = |cell: &SegmentCell| -> Option<(BTreeMap<String, String>, CellVerdict)> {
        let verdict = judge_cell(table, cell, proxy_metric, outcome_metric, config, estimator)?;
        Some((cell.segment().clone(), verdict))
    };

    #[cfg(feature = "rayon")]
    let verdicts: Vec<_> = cells.par_iter().filter_map(judge).collect();
    #[cfg(not(feature = "rayon"))]
    let verdicts: Vec<_> = cells.iter().filter_map(judge).collect();

    // Deterministic merge: BTreeMap keyed by segment value, not completion order
    let mut by_segment: BTreeMap<BTreeMap<String, String>, (usize, usize, usize)> = BTreeMap::new();
    for (segment, verdict) in verdicts {
        let entry = by_segment.entry(segment).or_default();
        entry.0 += usize::from(verdict.flipped);
        entry.1 += 1;
        entry.2 += verdict.n_total;
    }

    #[allow(clippy::cast_precision_loss)]
    let mut segments: Vec<FragileSegment> = by_segment
        .into_iter()
        .map(|(segment, (flips, n_cells, total_n))| FragileSegment {
            segment,
            flip_rate: flips as f64 / n_cells as f64,
            n_cells,
            avg_cell_size: total_n as f64 / n_cells as f64,
            rank: 0,
        })
        .collect();

    segments.sort_by(|a, b| {
        b.flip_rate
            .partial_cmp(&a.flip_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.n_cells.cmp(&a.n_cells))
            .then_with(|| a.segment.cmp(&b.segment))
    });
    for (i, segment) in segments.iter_mut().enumerate() {
        segment.rank = i + 1;
    }

    debug!(segments = segments.len(), "fragility ranking complete");
    Ok(segments)
}

fn judge_cell(
    table: &ExperimentTable,
    cell: &SegmentCell,
    proxy_metric: &str,
    outcome_metric: &str,
    config: &FragilityConfig,
    estimator: TreatmentEffectEstimator,
) -> Option<CellVerdict> {
    // Per-arm minimum: a cell with treatment rows but no control evidence
    // must never become a 0%-flip cell
    if cell.n_treatment() < config.min_count || cell.n_control() < config.min_count {
        return None;
    }

    let (pt, pc) = table.cell_arm_values(cell, proxy_metric);
    let (ot, oc) = table.cell_arm_values(cell, outcome_metric);
    let proxy = estimator.estimate(proxy_metric, &pt, &pc);
    let outcome = estimator.estimate(outcome_metric, &ot, &oc);
    if !proxy.is_ok() || !outcome.is_ok() {
        return None;
    }

    let proxy_effect = proxy.effect?;
    let outcome_effect = outcome.effect?;
    // Strictly opposite signs; the relative relationship is invariant under
    // negating both effects, and a zero proxy effect makes no claim
    let flipped =
        proxy_effect * outcome_effect < 0.0 && outcome_effect.abs() > config.materiality;

    Some(CellVerdict {
        flipped,
        n_total: cell.n_total(),
    })
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dataset::ExperimentRow;

    /// Build one experiment whose given segment cell has the requested arm
    /// means (with a little spread so estimates are non-degenerate).
    fn cell_rows(
        exp: &str,
        device: &str,
        proxy_means: (f64, f64),
        outcome_means: (f64, f64),
        n_per_arm: usize,
    ) -> Vec<ExperimentRow> {
        let mut rows = Vec::new();
        for i in 0..n_per_arm {
            // Symmetric jitter keeps the arm mean exact
            let jitter = if i % 2 == 0 { 0.001 } else { -0.001 };
            rows.push(
                ExperimentRow::builder(exp, true)
                    .segment("device", device)
                    .metric("proxy", proxy_means.0 + jitter)
                    .metric("outcome", outcome_means.0 + jitter)
                    .build(),
            );
            rows.push(
                ExperimentRow::builder(exp, false)
                    .segment("device", device)
                    .metric("proxy", proxy_means.1 + jitter)
                    .metric("outcome", outcome_means.1 + jitter)
                    .build(),
            );
        }
        rows
    }

    fn config() -> FragilityConfig {
        FragilityConfig::new(vec!["device".to_string()])
            .min_count(2)
            .materiality(0.01)
    }

    #[test]
    fn test_flip_flagged_above_materiality() {
        // proxy effect +0.05, outcome effect -0.03 => flip
        let rows = cell_rows("e1", "Mobile", (0.15, 0.10), (0.07, 0.10), 4);
        let table = ExperimentTable::from_rows(rows).unwrap();

        let segments = find_fragile_segments(&table, "proxy", "outcome", &config()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].segment["device"], "Mobile");
        assert_eq!(segments[0].flip_rate, 1.0);
        assert_eq!(segments[0].n_cells, 1);
        assert_eq!(segments[0].rank, 1);
    }

    #[test]
    fn test_flip_suppressed_below_materiality() {
        // Same sign mismatch but outcome effect -0.005 is immaterial
        let rows = cell_rows("e1", "Mobile", (0.15, 0.10), (0.095, 0.10), 4);
        let table = ExperimentTable::from_rows(rows).unwrap();

        let segments = find_fragile_segments(&table, "proxy", "outcome", &config()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].flip_rate, 0.0);
    }

    #[test]
    fn test_treatment_only_cell_excluded() {
        let mut rows = cell_rows("e1", "TV", (0.2, 0.1), (0.2, 0.1), 4);
        // A second experiment where the Mobile cell has no control rows at
        // all; the experiment itself still has both arms via the TV cell
        rows.extend(cell_rows("e2", "TV", (0.2, 0.1), (0.2, 0.1), 4));
        for _ in 0..4 {
            rows.push(
                ExperimentRow::builder("e2", true)
                    .segment("device", "Mobile")
                    .metric("proxy", 0.5)
                    .metric("outcome", 0.5)
                    .build(),
            );
        }
        let table = ExperimentTable::from_rows(rows).unwrap();

        let segments = find_fragile_segments(&table, "proxy", "outcome", &config()).unwrap();
        // Mobile has no qualifying cell: excluded entirely, not scored 0%
        assert!(segments.iter().all(|s| s.segment["device"] != "Mobile"));
    }

    #[test]
    fn test_ranking_prefers_more_evidence_on_ties() {
        let mut rows = Vec::new();
        // "a": 2 cells, both clean (flip_rate 0)
        rows.extend(cell_rows("e1", "a", (0.2, 0.1), (0.2, 0.1), 2));
        rows.extend(cell_rows("e2", "a", (0.2, 0.1), (0.2, 0.1), 2));
        // "b": 1 clean cell (flip_rate 0)
        rows.extend(cell_rows("e1", "b", (0.2, 0.1), (0.2, 0.1), 2));
        let table = ExperimentTable::from_rows(rows).unwrap();

        let segments = find_fragile_segments(&table, "proxy", "outcome", &config()).unwrap();
        assert_eq!(segments[0].segment["device"], "a");
        assert_eq!(segments[0].n_cells, 2);
        assert_eq!(segments[1].segment["device"], "b");
    }

    #[test]
    fn test_config_validation() {
        let table = ExperimentTable::from_rows(cell_rows("e1", "TV", (0.2, 0.1), (0.2, 0.1), 2))
            .unwrap();

        let empty = FragilityConfig::new(vec![]);
        assert!(empty.validate(&table).is_err());

        let bad_min = FragilityConfig::new(vec!["device".to_string()]).min_count(1);
        assert!(bad_min.validate(&table).is_err());

        let bad_floor = FragilityConfig::new(vec!["device".to_string()]).materiality(-1.0);
        assert!(bad_floor.validate(&table).is_err());

        let unknown_key = FragilityConfig::new(vec!["tenure".to_string()]);
        assert!(unknown_key.validate(&table).is_err());
    }
}
