//! Experiment observation schema and validated table views
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentTable (validated once at the boundary)
//!     └── ExperimentRow (N) [exp id, treatment arm, segments, metrics]
//! ```
//!
//! Everything downstream (effects, scores, fragility, decisions) is a pure
//! read view over this table; no derived entity owns or mutates another.
//!
//! ## Usage
//!
//! ```rust
//! use proxima::dataset::{ExperimentRow, ExperimentTable};
//!
//! let rows = vec![
//!     ExperimentRow::builder("exp-001", true)
//!         .segment("region", "EU")
//!         .metric("early_ctr", 0.14)
//!         .metric("long_retained", 1.0)
//!         .build(),
//!     ExperimentRow::builder("exp-001", false)
//!         .segment("region", "EU")
//!         .metric("early_ctr", 0.11)
//!         .metric("long_retained", 0.0)
//!         .build(),
//! ];
//! let table = ExperimentTable::from_rows(rows)?;
//! assert_eq!(table.valid_experiment_ids(), vec!["exp-001"]);
//! # Ok::<(), proxima::Error>(())
//! ```

mod row;
mod table;

pub use row::{ExperimentRow, ExperimentRowBuilder};
pub use table::{ExperimentTable, SegmentCell, TableSchema, NULL_SEGMENT};
