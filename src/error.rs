//! Errors returned by sketch construction, merging and deserialization.

use thiserror::Error;

use crate::registers::{MAX_PRECISION, MIN_PRECISION};

/// Sketch error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SketchError {
    /// Precision outside of the supported `[7, 31)` range.
    #[error("invalid precision {precision}: should be in [{MIN_PRECISION}, {MAX_PRECISION})")]
    InvalidConfiguration { precision: u8 },
    /// Attempt to merge sketches of different variants or precisions.
    #[error("cannot merge {lhs} with {rhs}")]
    IncompatibleMerge { lhs: String, rhs: String },
    /// Estimator name not recognized.
    #[error("unknown estimator: {0}")]
    UnknownVariant(String),
    /// Serialized sketch state is malformed.
    #[error("invalid sketch data: {0}")]
    InvalidData(&'static str),
}

impl SketchError {
    pub(crate) fn incompatible(lhs: impl Into<String>, rhs: impl Into<String>) -> Self {
        SketchError::IncompatibleMerge {
            lhs: lhs.into(),
            rhs: rhs.into(),
        }
    }
}
