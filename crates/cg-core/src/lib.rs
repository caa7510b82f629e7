//! Confession-geo core library
//!
//! This library provides the modelling pipeline over the 1880 parcel census:
//! - Parcel tables, header canonicalisation, and the old-district flag
//! - Covariate derivation and spatial grouping
//! - Hierarchical (optionally spatial) regression models
//! - The embedded NUTS sampler and the three-stage inference run
//! - Posterior summaries and posterior predictive checks
//!
//! The binary entry point is in `main.rs`.

pub mod covariates;
pub mod dataset;
pub mod diagnostics;
pub mod exit_codes;
pub mod grouping;
pub mod inference;
pub mod logging;
pub mod model;
pub mod parcel;
pub mod pipeline;
pub mod tax;
