//! Confession-geo common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the workspace:
//! - Run and parcel identity types
//! - The unified error taxonomy (configuration, data quality,
//!   numeric instability, persistence)
//! - Output format selection

pub mod error;
pub mod id;
pub mod output;

pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use id::{ParcelId, RunId};
pub use output::OutputFormat;

/// Schema version for persisted artifacts (traces, reports, snapshots).
pub const SCHEMA_VERSION: &str = "1.0.0";
