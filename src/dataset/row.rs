//! Experiment row - one user-level observation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One observation row: experiment id, binary treatment indicator, named
/// categorical segment attributes, and named numeric metric values (the
/// long-horizon outcome is one of the metric columns).
///
/// Rows are immutable once built; construct them through [`ExperimentRowBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRow {
    experiment_id: String,
    treatment: bool,
    segments: BTreeMap<String, String>,
    metrics: BTreeMap<String, f64>,
}

impl ExperimentRow {
    /// Create a builder for a row in the given experiment and arm.
    #[must_use]
    pub fn builder(experiment_id: impl Into<String>, treatment: bool) -> ExperimentRowBuilder {
        ExperimentRowBuilder {
            experiment_id: experiment_id.into(),
            treatment,
            segments: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Whether the row belongs to the treatment arm.
    #[must_use]
    pub const fn treatment(&self) -> bool {
        self.treatment
    }

    /// Get a segment attribute value by name.
    #[must_use]
    pub fn segment(&self, name: &str) -> Option<&str> {
        self.segments.get(name).map(String::as_str)
    }

    /// Get a metric value by name.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// All segment attributes, sorted by name.
    #[must_use]
    pub const fn segments(&self) -> &BTreeMap<String, String> {
        &self.segments
    }

    /// All metric values, sorted by name.
    #[must_use]
    pub const fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }
}

/// Builder for [`ExperimentRow`].
#[derive(Debug)]
pub struct ExperimentRowBuilder {
    experiment_id: String,
    treatment: bool,
    segments: BTreeMap<String, String>,
    metrics: BTreeMap<String, f64>,
}

impl ExperimentRowBuilder {
    /// Set a categorical segment attribute.
    #[must_use]
    pub fn segment(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.segments.insert(name.into(), value.into());
        self
    }

    /// Set a numeric metric value.
    #[must_use]
    pub fn metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Build the row.
    #[must_use]
    pub fn build(self) -> ExperimentRow {
        ExperimentRow {
            experiment_id: self.experiment_id,
            treatment: self.treatment,
            segments: self.segments,
            metrics: self.metrics,
        }
    }
}
