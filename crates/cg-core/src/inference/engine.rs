//! Posterior sampling engines.

use std::thread;

use cg_common::{Error, Result};
use cg_config::PipelineConfig;

use super::nuts::{run_chain, ChainDraws};
use super::LogDensity;
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};

/// Settings of one posterior run.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    pub draws: usize,
    pub tune: usize,
    pub chains: usize,
    pub target_accept: f64,
    pub max_treedepth: usize,
    pub max_divergence_fraction: f64,
    pub seed: u64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        SamplerSettings::from_config(&PipelineConfig::default())
    }
}

impl SamplerSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        SamplerSettings {
            draws: config.draws,
            tune: config.tune,
            chains: config.chains,
            target_accept: config.target_accept,
            max_treedepth: config.max_treedepth,
            max_divergence_fraction: config.max_divergence_fraction,
            seed: config.seed,
        }
    }
}

/// All chains of one run, in chain order.
#[derive(Debug, Clone)]
pub struct ChainSet {
    pub chains: Vec<ChainDraws>,
}

impl ChainSet {
    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn n_draws(&self) -> usize {
        self.chains.first().map_or(0, |c| c.draws.len())
    }

    pub fn divergences(&self) -> usize {
        self.chains.iter().map(ChainDraws::divergences).sum()
    }

    pub fn total_draws(&self) -> usize {
        self.chains.iter().map(|c| c.draws.len()).sum()
    }

    /// Fail when the divergent share exceeds `limit`.
    pub fn check_divergences(&self, limit: f64) -> Result<()> {
        let divergent = self.divergences();
        let total = self.total_draws();
        if total > 0 && divergent as f64 / total as f64 > limit {
            return Err(Error::Divergences {
                divergent,
                total,
                threshold: limit,
            });
        }
        Ok(())
    }
}

/// A posterior sampler over an unconstrained log density.
pub trait InferenceEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run every chain to completion. Blocks until all chains are done.
    fn sample(
        &self,
        model: &dyn LogDensity,
        settings: &SamplerSettings,
        ctx: &LogContext,
    ) -> Result<ChainSet>;
}

/// The embedded NUTS sampler, one scoped thread per chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct NutsEngine;

impl InferenceEngine for NutsEngine {
    fn name(&self) -> &'static str {
        "nuts"
    }

    fn sample(
        &self,
        model: &dyn LogDensity,
        settings: &SamplerSettings,
        ctx: &LogContext,
    ) -> Result<ChainSet> {
        if settings.chains == 0 {
            return Err(Error::InvalidOption {
                field: "chains".to_string(),
                message: "at least one chain is required".to_string(),
            });
        }

        let results: Vec<Result<ChainDraws>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..settings.chains)
                .map(|chain| scope.spawn(move || run_chain(model, settings, chain)))
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(chain, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(Error::NumericalInstability(format!("chain {} panicked", chain)))
                    })
                })
                .collect()
        });

        let mut chains = Vec::with_capacity(results.len());
        for result in results {
            let chain = result?;
            log_event!(
                ctx,
                DEBUG,
                event_names::CHAIN_DONE,
                Stage::Sample,
                "chain finished",
                chain = chain.chain,
                step_size = chain.step_size,
                divergences = chain.divergences(),
                init_attempts = chain.init_attempts
            );
            chains.push(chain);
        }

        let set = ChainSet { chains };
        set.check_divergences(settings.max_divergence_fraction)?;
        Ok(set)
    }
}
