//! Confession-geo numerical primitives.
//!
//! Missing-aware covariate transforms, Euclidean distances, the
//! squared-exponential spatial kernel, special functions, and MCMC
//! convergence statistics.

pub mod math;

pub use math::beta::*;
pub use math::distance::{
    nearest_distances, pairwise_distances, subsample, validate_distance_matrix, Point,
};
pub use math::error::MathError;
pub use math::kernel::{
    cholesky, correlate, gp_log_density, min_eigenvalue, squared, GpDensity, SquaredExponential,
};
pub use math::stable::*;
pub use math::summary::{
    ess_bulk, ess_mean, ess_tail, hdi, mean_sd, quantile, rhat, summarize, ParameterSummary,
};
pub use math::transform::{log_or_missing, ratio_or_missing, Standardizer};
