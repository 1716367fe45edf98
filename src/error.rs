//! Error types for Proxima
//!
//! Fatal conditions (schema, configuration) abort a call before any
//! computation. Localized data-quality states (insufficient samples,
//! degenerate variance) never surface here; they are absorbed into the
//! result structures so callers always receive a complete, annotated answer.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Proxima error types
#[derive(Error, Debug)]
pub enum Error {
    /// Required column missing, mistyped, or rows are inconsistent
    #[error("Schema error: {0}")]
    Schema(String),

    /// Invalid weights, thresholds, or sample minimums
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid caller input (empty metric list, unknown metric name)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
