//! Error types for confession-geo.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification matching the pipeline's failure taxonomy
//! - Retry hints (the modelling path never retries on its own)
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Dimension Mismatch
//!   Reason: distance matrix rows: expected 120, got 119
//!   Fix: Rebuild the distance matrix from the same row subset as the outcome vector.
//! ```
//!
//! # Machine-Facing Output
//!
//! ```json
//! {
//!   "code": 12,
//!   "category": "configuration",
//!   "message": "dimension mismatch for distance matrix rows: expected 120, got 119",
//!   "retryable": false,
//!   "context": { "what": "distance matrix rows", "expected": 120, "actual": 119 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for confession-geo operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid options, mismatched dimensions, impossible cluster counts.
    Configuration,
    /// Missing or malformed input values.
    DataQuality,
    /// Covariance factorisation failures and sampler pathologies.
    NumericInstability,
    /// Trace and report output failures.
    Persistence,
    /// Generic file I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::DataQuality => write!(f, "data_quality"),
            ErrorCategory::NumericInstability => write!(f, "numeric_instability"),
            ErrorCategory::Persistence => write!(f, "persistence"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for confession-geo.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid value for {field}: {message}")]
    InvalidOption { field: String, message: String },

    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("nearest-distance query needs at least one reference point")]
    NoReferencePoints,

    #[error("cannot form {requested} clusters from {distinct} distinct coordinates")]
    ClusterCount { requested: usize, distinct: usize },

    // Data quality errors (20-29)
    #[error("data quality error in column {column}{}: {message}", row_suffix(*.row))]
    DataQuality {
        row: Option<usize>,
        column: String,
        message: String,
    },

    #[error("missing required covariate {column} at row {row}")]
    MissingCovariate { row: usize, column: String },

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    // Numeric instability errors (30-39)
    #[error("numerical instability detected: {0}")]
    NumericalInstability(String),

    #[error("covariance matrix is not positive definite: {0}")]
    NotPositiveDefinite(String),

    #[error("sampler reported {divergent} divergent transitions out of {total} (limit {threshold:.3})")]
    Divergences {
        divergent: usize,
        total: usize,
        threshold: f64,
    },

    #[error("sampler failed to initialize: {0}")]
    SamplerInit(String),

    #[error("invalid run transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // Persistence errors (40-49)
    #[error("failed to persist {}: {message}", .path.display())]
    Persistence { path: PathBuf, message: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn row_suffix(row: Option<usize>) -> String {
    match row {
        Some(r) => format!(" (row {})", r),
        None => String::new(),
    }
}

impl Error {
    /// Shorthand for a data-quality error on a whole column.
    pub fn data_quality(column: impl Into<String>, message: impl Into<String>) -> Self {
        Error::DataQuality {
            row: None,
            column: column.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a dimension mismatch.
    pub fn dimension(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Error::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Data quality errors
    /// - 30-39: Numeric instability errors
    /// - 40-49: Persistence errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidOption { .. } => 11,
            Error::DimensionMismatch { .. } => 12,
            Error::NoReferencePoints => 13,
            Error::ClusterCount { .. } => 14,
            Error::DataQuality { .. } => 20,
            Error::MissingCovariate { .. } => 21,
            Error::Parse { .. } => 22,
            Error::NumericalInstability(_) => 30,
            Error::NotPositiveDefinite(_) => 31,
            Error::Divergences { .. } => 32,
            Error::SamplerInit(_) => 33,
            Error::InvalidTransition { .. } => 34,
            Error::Persistence { .. } => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_)
            | Error::InvalidOption { .. }
            | Error::DimensionMismatch { .. }
            | Error::NoReferencePoints
            | Error::ClusterCount { .. } => ErrorCategory::Configuration,

            Error::DataQuality { .. } | Error::MissingCovariate { .. } | Error::Parse { .. } => {
                ErrorCategory::DataQuality
            }

            Error::NumericalInstability(_)
            | Error::NotPositiveDefinite(_)
            | Error::Divergences { .. }
            | Error::SamplerInit(_)
            | Error::InvalidTransition { .. } => ErrorCategory::NumericInstability,

            Error::Persistence { .. } => ErrorCategory::Persistence,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether an operator may simply re-run the same command.
    ///
    /// Nothing in the pipeline retries automatically; this only informs the
    /// human or agent reading the error.
    pub fn is_retryable(&self) -> bool {
        match self.category() {
            ErrorCategory::Configuration | ErrorCategory::DataQuality => false,
            // A failed sampling run restarts from the built model.
            ErrorCategory::NumericInstability => {
                !matches!(self, Error::InvalidTransition { .. })
            }
            ErrorCategory::Persistence | ErrorCategory::Io => true,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::InvalidOption { .. } => {
                "Run 'cg-core config validate' and fix the reported option."
            }
            Error::DimensionMismatch { .. } => {
                "Rebuild distance matrix, groups, and covariates from the same row subset."
            }
            Error::NoReferencePoints => "Provide at least one church location.",
            Error::ClusterCount { .. } => {
                "Lower n_clusters or use administrative grouping for small datasets."
            }
            Error::DataQuality { .. } | Error::MissingCovariate { .. } => {
                "Inspect the offending row and column; rows with missing covariates are dropped, not imputed."
            }
            Error::Parse { .. } => "Check the input file for malformed values at the reported line.",
            Error::NumericalInstability(_) | Error::NotPositiveDefinite(_) => {
                "Increase the nugget or tighten the kernel hyper-priors, then rerun from the built model."
            }
            Error::Divergences { .. } => {
                "Raise target_accept or reparameterise the variant, then rerun from the built model."
            }
            Error::SamplerInit(_) => "Check the priors and covariate scaling; standardize inputs.",
            Error::InvalidTransition { .. } => {
                "Run the sampling stages in order: prior, posterior, posterior predictive, persist."
            }
            Error::Persistence { .. } => {
                "Check permissions and free space in the output directory."
            }
            Error::Io(_) => "Check that input paths exist and are readable.",
            Error::Json(_) => "Check JSON syntax in the referenced file.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidOption { .. } => "Invalid Option",
            Error::DimensionMismatch { .. } => "Dimension Mismatch",
            Error::NoReferencePoints => "No Reference Points",
            Error::ClusterCount { .. } => "Invalid Cluster Count",
            Error::DataQuality { .. } => "Data Quality Error",
            Error::MissingCovariate { .. } => "Missing Covariate",
            Error::Parse { .. } => "Parse Error",
            Error::NumericalInstability(_) => "Numerical Instability",
            Error::NotPositiveDefinite(_) => "Covariance Not Positive Definite",
            Error::Divergences { .. } => "Too Many Divergences",
            Error::SamplerInit(_) => "Sampler Initialization Failed",
            Error::InvalidTransition { .. } => "Invalid Run Transition",
            Error::Persistence { .. } => "Persistence Error",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
        }
    }

    /// Format for a terminal: headline, reason, fix.
    pub fn format_human(&self) -> String {
        format!(
            "✗ {}\n  Reason: {}\n  Fix: {}",
            self.headline(),
            self,
            self.remediation()
        )
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether re-running the same command can succeed.
    pub retryable: bool,

    /// Additional structured context (e.g., row, column, path).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::InvalidOption { field, .. } => {
                context.insert("field".to_string(), serde_json::json!(field));
            }
            Error::DimensionMismatch {
                what,
                expected,
                actual,
            } => {
                context.insert("what".to_string(), serde_json::json!(what));
                context.insert("expected".to_string(), serde_json::json!(expected));
                context.insert("actual".to_string(), serde_json::json!(actual));
            }
            Error::ClusterCount {
                requested,
                distinct,
            } => {
                context.insert("requested".to_string(), serde_json::json!(requested));
                context.insert("distinct".to_string(), serde_json::json!(distinct));
            }
            Error::DataQuality { row, column, .. } => {
                context.insert("column".to_string(), serde_json::json!(column));
                if let Some(row) = row {
                    context.insert("row".to_string(), serde_json::json!(row));
                }
            }
            Error::MissingCovariate { row, column } => {
                context.insert("column".to_string(), serde_json::json!(column));
                context.insert("row".to_string(), serde_json::json!(row));
            }
            Error::Parse { line, .. } => {
                context.insert("line".to_string(), serde_json::json!(line));
            }
            Error::Divergences {
                divergent, total, ..
            } => {
                context.insert("divergent".to_string(), serde_json::json!(divergent));
                context.insert("total".to_string(), serde_json::json!(total));
            }
            Error::Persistence { path, .. } => {
                context.insert("path".to_string(), serde_json::json!(path));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}
