//! Validated experiment table and its grouping views
//!
//! The table is the single data boundary of the crate: schema checks happen
//! once here, so the statistical modules can assume well-formed rows. All
//! derived results are pure read views recomputed from this table on demand.

use std::collections::{BTreeMap, BTreeSet};

use arrow::array::{
    Array, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

use super::row::ExperimentRow;

/// Placeholder category for null segment attribute values.
pub const NULL_SEGMENT: &str = "(none)";

/// Column mapping for ingesting an Arrow [`RecordBatch`].
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Column holding the experiment identifier (Utf8 or integer)
    pub experiment_id: String,
    /// Column holding the binary treatment indicator (Boolean or 0/1 integer)
    pub treatment: String,
    /// Categorical segment attribute columns (Utf8, nullable)
    pub segments: Vec<String>,
    /// Numeric metric columns, including the long-horizon outcome
    pub metrics: Vec<String>,
}

impl TableSchema {
    /// Create a mapping with the two required columns.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, treatment: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            treatment: treatment.into(),
            segments: Vec::new(),
            metrics: Vec::new(),
        }
    }

    /// Add a segment attribute column.
    #[must_use]
    pub fn segment(mut self, name: impl Into<String>) -> Self {
        self.segments.push(name.into());
        self
    }

    /// Add a numeric metric column.
    #[must_use]
    pub fn metric(mut self, name: impl Into<String>) -> Self {
        self.metrics.push(name.into());
        self
    }
}

/// Row indices of one (experiment, segment-value) cell, split by arm.
#[derive(Debug, Clone)]
pub struct SegmentCell {
    experiment_id: String,
    segment: BTreeMap<String, String>,
    treatment: Vec<usize>,
    control: Vec<usize>,
}

impl SegmentCell {
    /// Experiment this cell belongs to.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Segment attribute values identifying the cell.
    #[must_use]
    pub const fn segment(&self) -> &BTreeMap<String, String> {
        &self.segment
    }

    /// Number of treatment observations in the cell.
    #[must_use]
    pub fn n_treatment(&self) -> usize {
        self.treatment.len()
    }

    /// Number of control observations in the cell.
    #[must_use]
    pub fn n_control(&self) -> usize {
        self.control.len()
    }

    /// Total observations in the cell.
    #[must_use]
    pub fn n_total(&self) -> usize {
        self.treatment.len() + self.control.len()
    }
}

/// Immutable, validated collection of [`ExperimentRow`]s.
///
/// ## Validation
///
/// `from_rows` checks once, at the boundary:
/// - the table is non-empty and every experiment id is non-empty
/// - all rows carry the same metric and segment column sets
/// - every metric value is finite
///
/// Experiments lacking at least one treatment and one control observation
/// stay in the table but are excluded from every aggregation view
/// (see [`ExperimentTable::valid_experiment_ids`]).
#[derive(Debug, Clone)]
pub struct ExperimentTable {
    rows: Vec<ExperimentRow>,
    metric_names: BTreeSet<String>,
    segment_names: BTreeSet<String>,
    by_experiment: BTreeMap<String, (Vec<usize>, Vec<usize>)>,
}

impl ExperimentTable {
    /// Build a table from rows, validating the schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if the rows are empty, inconsistent in their
    /// column sets, carry empty experiment ids, or contain non-finite metrics.
    pub fn from_rows(rows: Vec<ExperimentRow>) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(Error::Schema("table contains no rows".to_string()));
        };

        let metric_names: BTreeSet<String> = first.metrics().keys().cloned().collect();
        let segment_names: BTreeSet<String> = first.segments().keys().cloned().collect();

        for (i, row) in rows.iter().enumerate() {
            if row.experiment_id().is_empty() {
                return Err(Error::Schema(format!("row {i} has an empty experiment id")));
            }
            if row.metrics().len() != metric_names.len()
                || !row.metrics().keys().all(|k| metric_names.contains(k))
            {
                return Err(Error::Schema(format!(
                    "row {i} metric columns differ from the first row"
                )));
            }
            if row.segments().len() != segment_names.len()
                || !row.segments().keys().all(|k| segment_names.contains(k))
            {
                return Err(Error::Schema(format!(
                    "row {i} segment columns differ from the first row"
                )));
            }
            for (name, value) in row.metrics() {
                if !value.is_finite() {
                    return Err(Error::Schema(format!(
                        "row {i} metric '{name}' is not finite"
                    )));
                }
            }
        }

        let mut by_experiment: BTreeMap<String, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
        for (i, row) in rows.iter().enumerate() {
            let arms = by_experiment.entry(row.experiment_id().to_string()).or_default();
            if row.treatment() {
                arms.0.push(i);
            } else {
                arms.1.push(i);
            }
        }

        Ok(Self {
            rows,
            metric_names,
            segment_names,
            by_experiment,
        })
    }

    /// Ingest an Arrow record batch using the given column mapping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if a mapped column is missing, has an
    /// unsupported data type, the treatment column is not strictly binary,
    /// or a metric value is null.
    pub fn from_record_batch(batch: &RecordBatch, schema: &TableSchema) -> Result<Self> {
        // Resolve every mapped column once; the row loop is index-only
        let mut columns: FxHashMap<&str, usize> = FxHashMap::default();
        for name in [schema.experiment_id.as_str(), schema.treatment.as_str()]
            .into_iter()
            .chain(schema.segments.iter().map(String::as_str))
            .chain(schema.metrics.iter().map(String::as_str))
        {
            columns.insert(name, column_index(batch, name)?);
        }
        let ids = columns[schema.experiment_id.as_str()];
        let treatment_idx = columns[schema.treatment.as_str()];

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let experiment_id = id_value(batch, ids, i, &schema.experiment_id)?;
            let treatment = treatment_value(batch, treatment_idx, i, &schema.treatment)?;

            let mut builder = ExperimentRow::builder(experiment_id, treatment);
            for name in &schema.segments {
                let idx = columns[name.as_str()];
                builder = builder.segment(name, segment_value(batch, idx, i, name)?);
            }
            for name in &schema.metrics {
                let idx = columns[name.as_str()];
                builder = builder.metric(name, numeric_value(batch, idx, i, name)?);
            }
            rows.push(builder.build());
        }

        Self::from_rows(rows)
    }

    /// Number of rows in the table.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// The validated rows, in insertion order.
    #[must_use]
    pub fn rows(&self) -> &[ExperimentRow] {
        &self.rows
    }

    /// Metric column names, sorted.
    #[must_use]
    pub const fn metric_names(&self) -> &BTreeSet<String> {
        &self.metric_names
    }

    /// Segment attribute names, sorted.
    #[must_use]
    pub const fn segment_names(&self) -> &BTreeSet<String> {
        &self.segment_names
    }

    /// Whether the table carries the given metric column.
    #[must_use]
    pub fn has_metric(&self, name: &str) -> bool {
        self.metric_names.contains(name)
    }

    /// Whether the table carries the given segment attribute.
    #[must_use]
    pub fn has_segment(&self, name: &str) -> bool {
        self.segment_names.contains(name)
    }

    /// All experiment ids, sorted.
    #[must_use]
    pub fn experiment_ids(&self) -> Vec<&str> {
        self.by_experiment.keys().map(String::as_str).collect()
    }

    /// Experiment ids with at least one observation in each arm, sorted.
    ///
    /// Experiments failing this invariant are excluded from all aggregation.
    #[must_use]
    pub fn valid_experiment_ids(&self) -> Vec<&str> {
        self.by_experiment
            .iter()
            .filter(|(_, (t, c))| !t.is_empty() && !c.is_empty())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Metric values for one experiment, split into (treatment, control).
    #[must_use]
    pub fn arm_values(&self, experiment_id: &str, metric: &str) -> (Vec<f64>, Vec<f64>) {
        self.by_experiment
            .get(experiment_id)
            .map_or((Vec::new(), Vec::new()), |(t, c)| {
                (self.metric_at(t, metric), self.metric_at(c, metric))
            })
    }

    /// All (experiment, segment-value) cells for the given segment keys,
    /// restricted to experiments with both arms present. Cells are returned
    /// in deterministic (experiment id, segment value) order.
    #[must_use]
    pub fn segment_cells(&self, segment_keys: &[String]) -> Vec<SegmentCell> {
        let mut cells: BTreeMap<(String, BTreeMap<String, String>), (Vec<usize>, Vec<usize>)> =
            BTreeMap::new();

        for id in self.valid_experiment_ids() {
            let (t, c) = &self.by_experiment[id];
            for (&idx, is_treatment) in t
                .iter()
                .map(|i| (i, true))
                .chain(c.iter().map(|i| (i, false)))
            {
                let row = &self.rows[idx];
                let segment: BTreeMap<String, String> = segment_keys
                    .iter()
                    .map(|k| {
                        (
                            k.clone(),
                            row.segment(k).unwrap_or(NULL_SEGMENT).to_string(),
                        )
                    })
                    .collect();
                let entry = cells.entry((id.to_string(), segment)).or_default();
                if is_treatment {
                    entry.0.push(idx);
                } else {
                    entry.1.push(idx);
                }
            }
        }

        cells
            .into_iter()
            .map(|((experiment_id, segment), (treatment, control))| SegmentCell {
                experiment_id,
                segment,
                treatment,
                control,
            })
            .collect()
    }

    /// Metric values for one cell, split into (treatment, control).
    #[must_use]
    pub fn cell_arm_values(&self, cell: &SegmentCell, metric: &str) -> (Vec<f64>, Vec<f64>) {
        (
            self.metric_at(&cell.treatment, metric),
            self.metric_at(&cell.control, metric),
        )
    }

    fn metric_at(&self, indices: &[usize], metric: &str) -> Vec<f64> {
        indices
            .iter()
            .filter_map(|&i| self.rows[i].metric(metric))
            .collect()
    }
}

fn column_index(batch: &RecordBatch, name: &str) -> Result<usize> {
    batch
        .schema()
        .index_of(name)
        .map_err(|_| Error::Schema(format!("required column '{name}' not found")))
}

fn id_value(batch: &RecordBatch, idx: usize, row: usize, name: &str) -> Result<String> {
    let column = batch.column(idx);
    if column.is_null(row) {
        return Err(Error::Schema(format!(
            "column '{name}' has a null experiment id at row {row}"
        )));
    }
    match column.data_type() {
        DataType::Utf8 => {
            let array = downcast::<StringArray>(column, name)?;
            Ok(array.value(row).to_string())
        }
        DataType::Int32 => {
            let array = downcast::<Int32Array>(column, name)?;
            Ok(array.value(row).to_string())
        }
        DataType::Int64 => {
            let array = downcast::<Int64Array>(column, name)?;
            Ok(array.value(row).to_string())
        }
        dt => Err(Error::Schema(format!(
            "experiment id column '{name}' has unsupported type {dt:?}"
        ))),
    }
}

fn treatment_value(batch: &RecordBatch, idx: usize, row: usize, name: &str) -> Result<bool> {
    let column = batch.column(idx);
    if column.is_null(row) {
        return Err(Error::Schema(format!(
            "treatment column '{name}' is null at row {row}"
        )));
    }
    let as_binary = |v: i64| match v {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::Schema(format!(
            "treatment column '{name}' must be strictly binary, found {other} at row {row}"
        ))),
    };
    match column.data_type() {
        DataType::Boolean => {
            let array = downcast::<BooleanArray>(column, name)?;
            Ok(array.value(row))
        }
        DataType::Int32 => {
            let array = downcast::<Int32Array>(column, name)?;
            as_binary(i64::from(array.value(row)))
        }
        DataType::Int64 => {
            let array = downcast::<Int64Array>(column, name)?;
            as_binary(array.value(row))
        }
        dt => Err(Error::Schema(format!(
            "treatment column '{name}' has unsupported type {dt:?}"
        ))),
    }
}

fn segment_value(batch: &RecordBatch, idx: usize, row: usize, name: &str) -> Result<String> {
    let column = batch.column(idx);
    if column.is_null(row) {
        return Ok(NULL_SEGMENT.to_string());
    }
    match column.data_type() {
        DataType::Utf8 => {
            let array = downcast::<StringArray>(column, name)?;
            Ok(array.value(row).to_string())
        }
        dt => Err(Error::Schema(format!(
            "segment column '{name}' must be Utf8, found {dt:?}"
        ))),
    }
}

#[allow(clippy::cast_lossless)]
fn numeric_value(batch: &RecordBatch, idx: usize, row: usize, name: &str) -> Result<f64> {
    let column = batch.column(idx);
    if column.is_null(row) {
        return Err(Error::Schema(format!(
            "metric column '{name}' is null at row {row} (metrics are non-nullable)"
        )));
    }
    match column.data_type() {
        DataType::Float64 => {
            let array = downcast::<Float64Array>(column, name)?;
            Ok(array.value(row))
        }
        DataType::Float32 => {
            let array = downcast::<Float32Array>(column, name)?;
            Ok(f64::from(array.value(row)))
        }
        DataType::Int32 => {
            let array = downcast::<Int32Array>(column, name)?;
            Ok(f64::from(array.value(row)))
        }
        DataType::Int64 => {
            let array = downcast::<Int64Array>(column, name)?;
            #[allow(clippy::cast_precision_loss)]
            Ok(array.value(row) as f64)
        }
        dt => Err(Error::Schema(format!(
            "metric column '{name}' must be numeric, found {dt:?}"
        ))),
    }
}

fn downcast<'a, T: 'static>(column: &'a dyn Array, name: &str) -> Result<&'a T> {
    column
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::Schema(format!("failed to downcast column '{name}'")))
}
