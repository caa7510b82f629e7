//! Errors from trace encoding, decoding, and storage.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("draws for {variable}: {message}")]
    Shape { variable: String, message: String },

    #[error("trace file is malformed: {0}")]
    Corrupt(String),

    #[error("trace schema version {found} is not supported (expected {expected})")]
    Version { found: String, expected: String },

    #[error("missing trace artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Writer not initialized")]
    NotInitialized,

    #[error("Buffer empty")]
    EmptyBuffer,
}

impl TraceError {
    /// Attach the artifact path when converting into the workspace error.
    pub fn at(self, path: impl Into<PathBuf>) -> cg_common::Error {
        cg_common::Error::Persistence {
            path: path.into(),
            message: self.to_string(),
        }
    }
}

impl From<TraceError> for cg_common::Error {
    fn from(err: TraceError) -> Self {
        let path = match &err {
            TraceError::MissingArtifact(p) => p.clone(),
            _ => PathBuf::new(),
        };
        err.at(path)
    }
}
