//! Crate-wide error taxonomy
//!
//! Every failure in the rehydration/evaluation pipeline flows through this
//! enum so that the per-repeat boundary in the aggregator can log and skip a
//! repeat uniformly, whatever layer the failure originated in.

use thiserror::Error;

/// Errors raised while rehydrating snapshots or evaluating models.
#[derive(Debug, Error)]
pub enum Error {
    /// The variant tag names no known detector kind. Never silently
    /// defaulted: an unrecognized tag is a typed failure, not an identity
    /// projection plus a fallback detector.
    #[error("unsupported variant tag: {tag:?}")]
    UnsupportedVariant { tag: String },

    /// A field the matched variant requires is missing or has the wrong
    /// shape. The expected field set per variant is fixed and total.
    #[error("malformed snapshot: field {field:?}: {reason}")]
    MalformedSnapshot { field: String, reason: String },

    /// Input feature width does not match the reconstructed parameters.
    #[error("dimension mismatch: expected {expected} columns, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// ROC is undefined when the label vector lacks one of the two classes.
    #[error("degenerate labels: {positives} positives, {negatives} negatives")]
    DegenerateLabels { positives: usize, negatives: usize },

    /// The test set has no rows.
    #[error("empty test set")]
    EmptyTestSet,

    /// Snapshot or test-set artifact could not be read.
    #[error("snapshot I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot or test-set artifact could not be decoded.
    #[error("snapshot decode failure: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for the missing/ill-typed field case.
    pub fn malformed(field: &str, reason: impl Into<String>) -> Self {
        Error::MalformedSnapshot {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
