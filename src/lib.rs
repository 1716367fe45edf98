//! # Proxima: Proxy-Metric Reliability Engine
//!
//! Proxima evaluates whether short-horizon "proxy" measurements reliably
//! predict long-horizon experiment outcomes, for online randomized
//! experiments segmented by user attributes.
//!
//! The crate is the statistical core only; REST layers, CLIs, and dashboards
//! are consumers of its three side-effect-free entry points:
//!
//! - [`score_proxies`] - ranked composite reliability per proxy metric
//! - [`find_fragile_segments`] - segments where proxy and outcome effects
//!   disagree in sign
//! - [`simulate_decisions`] - ship/no-ship quality against the oracle
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Poka-Yoke safety**: schema and configuration are validated once at
//!   the boundary; numeric edge cases (zero variance, undersized samples)
//!   are explicit states, never panics
//! - **Jidoka**: the oracle baseline must score a perfect win rate on every
//!   run, a built-in self-test of the simulator
//! - **Genchi Genbutsu**: rankings are deterministic and reproducible,
//!   including tie-break order
//!
//! ## Example Usage
//!
//! ```rust
//! use proxima::{score_proxies, ExperimentRow, ExperimentTable, ScoringConfig};
//!
//! let mut rows = Vec::new();
//! for exp in ["exp-1", "exp-2", "exp-3"] {
//!     for i in 0..6 {
//!         let treated = i % 2 == 0;
//!         let lift = if treated { 0.1 } else { 0.0 };
//!         rows.push(
//!             ExperimentRow::builder(exp, treated)
//!                 .segment("region", if i < 3 { "EU" } else { "NA" })
//!                 .metric("early_ctr", 0.10 + lift + 0.01 * f64::from(i))
//!                 .metric("long_retained", 0.50 + lift + 0.01 * f64::from(i))
//!                 .build(),
//!         );
//!     }
//! }
//! let table = ExperimentTable::from_rows(rows)?;
//!
//! let config = ScoringConfig::new("long_retained", vec!["region".to_string()]);
//! let report = score_proxies(&table, &["early_ctr"], &config)?;
//! assert!(report.scores.len() + report.insufficient.len() == 1);
//! # Ok::<(), proxima::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod dataset;
pub mod decision;
pub mod error;
pub mod estimator;
pub mod fragility;
pub mod scorer;
pub mod stats;

pub use dataset::{ExperimentRow, ExperimentTable, TableSchema};
pub use decision::{simulate_decisions, DecisionConfig, DecisionSimResult, ORACLE_NAME};
pub use error::{Error, Result};
pub use estimator::{EffectValidity, TreatmentEffect, TreatmentEffectEstimator};
pub use fragility::{find_fragile_segments, FragileSegment, FragilityConfig};
pub use scorer::{
    score_proxies, InsufficientProxy, ProxyReliabilityScore, ProxyScoreReport, ScoreDiagnostics,
    ScoringConfig, ScoringWeights,
};
