//! Errors raised by numerical routines.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MathError {
    #[error("nearest-distance query needs at least one reference point")]
    NoReferencePoints,

    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    Dimension {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid distance matrix: {0}")]
    InvalidDistanceMatrix(String),

    #[error("matrix is not positive definite: {0}")]
    NotPositiveDefinite(String),
}

impl From<MathError> for cg_common::Error {
    fn from(err: MathError) -> Self {
        match err {
            MathError::NoReferencePoints => cg_common::Error::NoReferencePoints,
            MathError::Dimension {
                what,
                expected,
                actual,
            } => cg_common::Error::dimension(what, expected, actual),
            MathError::InvalidDistanceMatrix(msg) => cg_common::Error::InvalidOption {
                field: "distance_matrix".to_string(),
                message: msg,
            },
            MathError::NotPositiveDefinite(msg) => cg_common::Error::NotPositiveDefinite(msg),
        }
    }
}
