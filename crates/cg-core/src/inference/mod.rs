//! Sampling for built models.
//!
//! [`LogDensity`] is the seam between a model and a sampler: anything with
//! an unconstrained log density and its gradient can be sampled by an
//! [`InferenceEngine`]. [`InferenceRun`] sequences the prior, posterior and
//! posterior-predictive stages for one model and persists the traces.

pub mod adapt;
pub mod engine;
pub mod nuts;
pub mod orchestrator;

pub use engine::{ChainSet, InferenceEngine, NutsEngine, SamplerSettings};
pub use nuts::{ChainDraws, TransitionStats};
pub use orchestrator::{InferenceRun, RunState};

/// A differentiable log density over `R^dim`.
pub trait LogDensity: Sync {
    fn dim(&self) -> usize;

    /// Log density at `q` (up to a constant), writing `d/dq` into `grad`.
    /// Returns a non-finite value where the density is undefined.
    fn log_density_and_gradient(&self, q: &[f64], grad: &mut [f64]) -> f64;
}
