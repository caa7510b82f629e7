//! The three-stage sampling protocol for one model.
//!
//! ```text
//! Built -> PriorSampled -> PosteriorSampled -> PosteriorPredictiveSampled -> Persisted
//! ```
//!
//! Each stage fills one collection of the [`TraceSet`]. Calling a stage out
//! of order fails with `InvalidTransition`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cg_common::{Error, Result};
use cg_trace::{Draws, GroupKind, SampleCollection, TraceSet};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::engine::{ChainSet, InferenceEngine, SamplerSettings};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::model::ModelSpec;

/// Progress of an [`InferenceRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Built,
    PriorSampled,
    PosteriorSampled,
    PosteriorPredictiveSampled,
    Persisted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Built => "built",
            RunState::PriorSampled => "prior_sampled",
            RunState::PosteriorSampled => "posterior_sampled",
            RunState::PosteriorPredictiveSampled => "posterior_predictive_sampled",
            RunState::Persisted => "persisted",
        };
        f.write_str(s)
    }
}

/// Constrained parameter values indexed `[chain][draw]`.
type ValueGrid = Vec<Vec<Vec<f64>>>;

/// Sampling state of one model.
pub struct InferenceRun {
    spec: Arc<ModelSpec>,
    state: RunState,
    traces: TraceSet,
    posterior: Option<ValueGrid>,
}

impl InferenceRun {
    pub fn new(spec: Arc<ModelSpec>) -> Self {
        InferenceRun {
            spec,
            state: RunState::Built,
            traces: TraceSet::default(),
            posterior: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn traces(&self) -> &TraceSet {
        &self.traces
    }

    pub fn into_traces(self) -> TraceSet {
        self.traces
    }

    fn advance(&mut self, from: RunState, to: RunState) -> Result<()> {
        if self.state != from {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    /// Forward-simulate `n_samples` parameter sets and outcome draws.
    pub fn sample_prior(&mut self, n_samples: usize, seed: u64, ctx: &LogContext) -> Result<()> {
        self.advance(RunState::Built, RunState::PriorSampled)?;
        let spec = &self.spec;
        let mut rng = StdRng::seed_from_u64(seed);

        let mut values = Vec::with_capacity(n_samples);
        let mut outcomes = Vec::with_capacity(n_samples);
        for _ in 0..n_samples {
            let v = spec.sample_parameters(&mut rng)?;
            let mu = spec.linear_predictors(&v);
            outcomes.push(spec.simulate_outcomes(&v, &mu, &mut rng)?);
            values.push(v);
        }
        let grid = vec![values];
        let mut collection = parameter_collection(spec, GroupKind::Prior, &grid)?;
        collection.merge(outcome_collection(spec, GroupKind::PriorPredictive, &[outcomes])?);
        collection.merge(observed_collection(spec));
        self.traces.prior = collection;
        self.state = RunState::PriorSampled;

        log_event!(
            ctx,
            INFO,
            event_names::PRIOR_DONE,
            Stage::Sample,
            "prior predictive sampled",
            samples = n_samples,
            parameters = spec.dim()
        );
        Ok(())
    }

    /// Sample the posterior with `engine`.
    pub fn sample_posterior(
        &mut self,
        engine: &dyn InferenceEngine,
        settings: &SamplerSettings,
        ctx: &LogContext,
    ) -> Result<()> {
        self.advance(RunState::PriorSampled, RunState::PosteriorSampled)?;
        let spec = Arc::clone(&self.spec);
        let chains = engine.sample(spec.as_ref(), settings, ctx)?;

        let grid: ValueGrid = chains
            .chains
            .iter()
            .map(|c| c.draws.iter().map(|q| spec.layout.constrain(q)).collect())
            .collect();
        let mut collection = parameter_collection(&spec, GroupKind::Posterior, &grid)?;
        collection.merge(sample_stats(&chains)?);
        collection.merge(observed_collection(&spec));
        self.traces.posterior = collection;
        self.posterior = Some(grid);
        self.state = RunState::PosteriorSampled;

        log_event!(
            ctx,
            INFO,
            event_names::POSTERIOR_DONE,
            Stage::Sample,
            "posterior sampled",
            engine = engine.name(),
            chains = chains.n_chains(),
            draws = chains.n_draws(),
            divergences = chains.divergences()
        );
        Ok(())
    }

    /// Draw outcomes for every posterior draw.
    pub fn sample_posterior_predictive(&mut self, seed: u64, ctx: &LogContext) -> Result<()> {
        self.advance(RunState::PosteriorSampled, RunState::PosteriorPredictiveSampled)?;
        let spec = &self.spec;
        let grid = self.posterior.as_ref().ok_or_else(|| Error::InvalidTransition {
            from: self.state.to_string(),
            to: RunState::PosteriorPredictiveSampled.to_string(),
        })?;
        let mut rng = StdRng::seed_from_u64(seed);

        let mut outcomes = Vec::with_capacity(grid.len());
        for chain in grid {
            let mut per_chain = Vec::with_capacity(chain.len());
            for values in chain {
                let mu = spec.linear_predictors(values);
                per_chain.push(spec.simulate_outcomes(values, &mu, &mut rng)?);
            }
            outcomes.push(per_chain);
        }
        let mut collection = outcome_collection(spec, GroupKind::PosteriorPredictive, &outcomes)?;
        collection.merge(observed_collection(spec));
        self.traces.posterior_prediction = collection;
        self.state = RunState::PosteriorPredictiveSampled;

        log_event!(
            ctx,
            INFO,
            event_names::PREDICTIVE_DONE,
            Stage::Sample,
            "posterior predictive sampled",
            chains = outcomes.len()
        );
        Ok(())
    }

    /// Clear `dir` and write the three trace artifacts.
    pub fn persist(&mut self, dir: &Path, ctx: &LogContext) -> Result<Vec<PathBuf>> {
        self.advance(RunState::PosteriorPredictiveSampled, RunState::Persisted)?;
        let written = cg_trace::persist(&self.traces, dir).map_err(|e| e.at(dir))?;
        self.state = RunState::Persisted;

        log_event!(
            ctx,
            INFO,
            event_names::TRACE_PERSISTED,
            Stage::Persist,
            "traces written",
            dir = dir.display().to_string().as_str(),
            files = written.len()
        );
        Ok(written)
    }
}

fn shape_error(variable: &str, err: cg_trace::TraceError) -> Error {
    Error::NumericalInstability(format!("trace layout for {}: {}", variable, err))
}

/// Parameter blocks and linear predictors for a `[chain][draw]` grid.
fn parameter_collection(
    spec: &ModelSpec,
    group: GroupKind,
    grid: &ValueGrid,
) -> Result<SampleCollection> {
    let chains = grid.len();
    let draws = grid.first().map_or(0, Vec::len);
    let mut collection = SampleCollection::new();

    for block in spec.layout.blocks() {
        let mut values = Vec::with_capacity(chains * draws * block.len());
        for chain in grid {
            for v in chain {
                values.extend_from_slice(&v[block.range()]);
            }
        }
        let d = Draws::from_values(chains, draws, block.shape.clone(), values)
            .map_err(|e| shape_error(&block.name, e))?;
        collection.insert(group, block.name.clone(), d);
    }

    let mut mu_values: Vec<Vec<f64>> = vec![Vec::with_capacity(chains * draws * spec.n); spec.equations.len()];
    for chain in grid {
        for v in chain {
            for (e, mu) in spec.linear_predictors(v).into_iter().enumerate() {
                mu_values[e].extend(mu);
            }
        }
    }
    for (e, values) in mu_values.into_iter().enumerate() {
        let name = spec.mu_name(e);
        let d = Draws::from_values(chains, draws, vec![spec.n], values)
            .map_err(|err| shape_error(&name, err))?;
        collection.insert(group, name, d);
    }
    Ok(collection)
}

/// Simulated outcomes indexed `[chain][draw][equation][row]`.
fn outcome_collection(
    spec: &ModelSpec,
    group: GroupKind,
    outcomes: &[Vec<Vec<Vec<f64>>>],
) -> Result<SampleCollection> {
    let chains = outcomes.len();
    let draws = outcomes.first().map_or(0, Vec::len);
    let mut collection = SampleCollection::new();
    for (e, eq) in spec.equations.iter().enumerate() {
        let values: Vec<f64> = outcomes
            .iter()
            .flatten()
            .flat_map(|draw| draw[e].iter().copied())
            .collect();
        let d = Draws::from_values(chains, draws, vec![spec.n], values)
            .map_err(|err| shape_error(&eq.name, err))?;
        collection.insert(group, eq.name.clone(), d);
    }
    Ok(collection)
}

fn observed_collection(spec: &ModelSpec) -> SampleCollection {
    let mut collection = SampleCollection::new();
    for (e, eq) in spec.equations.iter().enumerate() {
        collection.insert(
            GroupKind::ObservedData,
            eq.name.clone(),
            Draws::constant(spec.observed(e).to_vec()),
        );
    }
    collection
}

fn sample_stats(chains: &ChainSet) -> Result<SampleCollection> {
    let n_chains = chains.n_chains();
    let n_draws = chains.n_draws();
    let columns: [(&str, fn(&super::TransitionStats) -> f64); 7] = [
        ("diverging", |s| if s.diverging { 1.0 } else { 0.0 }),
        ("acceptance_rate", |s| s.acceptance_rate),
        ("step_size", |s| s.step_size),
        ("tree_depth", |s| s.tree_depth as f64),
        ("n_steps", |s| s.n_steps as f64),
        ("energy", |s| s.energy),
        ("lp", |s| s.lp),
    ];
    let mut collection = SampleCollection::new();
    for (name, get) in columns {
        let values: Vec<f64> = chains
            .chains
            .iter()
            .flat_map(|c| c.stats.iter().map(get))
            .collect();
        let d = Draws::from_values(n_chains, n_draws, vec![], values)
            .map_err(|e| shape_error(name, e))?;
        collection.insert(GroupKind::SampleStats, name, d);
    }
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::covariates::Covariate;
    use crate::inference::NutsEngine;
    use crate::model::{Equation, Likelihood, Pooling, ScalePrior, Term};
    use cg_config::ModelVariant;
    use tempfile::TempDir;

    fn small_spec() -> Arc<ModelSpec> {
        let n = 12;
        let w: Vec<f64> = (0..n).map(|i| (i as f64 - 5.5) / 4.0).collect();
        let y: Vec<f64> = w.iter().enumerate().map(|(i, x)| 0.4 + 0.8 * x + ((i % 3) as f64 - 1.0) * 0.1).collect();
        let mut cols = BTreeMap::new();
        cols.insert(Covariate::EstateIncomeLn, w);
        cols.insert(Covariate::OrthodoxProportionLn, y);
        let eq = Equation {
            name: "O".to_string(),
            outcome: Covariate::OrthodoxProportionLn,
            terms: vec![Term::Intercept, Term::Covariate(Covariate::EstateIncomeLn)],
            pooling: Pooling::Pooled {
                prior_var: vec![1.0, 1.0],
            },
            spatial: false,
            likelihood: Likelihood::Normal {
                sigma_prior: ScalePrior::Exponential { rate: 1.0 },
            },
        };
        Arc::new(
            ModelSpec::new(ModelVariant::PooledTwoStage, vec![0; n], 1, cols, vec![eq], None).unwrap(),
        )
    }

    fn settings() -> SamplerSettings {
        SamplerSettings {
            draws: 60,
            tune: 60,
            chains: 2,
            ..SamplerSettings::default()
        }
    }

    #[test]
    fn stages_must_run_in_order() {
        let ctx = LogContext::new("test");
        let mut run = InferenceRun::new(small_spec());
        let err = run.sample_posterior(&NutsEngine, &settings(), &ctx).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(run.state(), RunState::Built);

        let err = run.sample_posterior_predictive(1, &ctx).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn full_protocol_fills_every_group() {
        let ctx = LogContext::new("test");
        let dir = TempDir::new().unwrap();
        let mut run = InferenceRun::new(small_spec());
        run.sample_prior(25, 42, &ctx).unwrap();
        run.sample_posterior(&NutsEngine, &settings(), &ctx).unwrap();
        run.sample_posterior_predictive(42, &ctx).unwrap();
        let files = run.persist(dir.path(), &ctx).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(run.state(), RunState::Persisted);

        let traces = run.traces();
        let beta = traces.prior.get(GroupKind::Prior, "beta_O").unwrap();
        assert_eq!((beta.chains, beta.draws, beta.shape.clone()), (1, 25, vec![2]));
        assert!(traces.prior.get(GroupKind::PriorPredictive, "O").is_some());
        assert!(traces.prior.get(GroupKind::Prior, "mu_O").is_some());

        let sigma = traces.posterior.get(GroupKind::Posterior, "sigma_O").unwrap();
        assert_eq!((sigma.chains, sigma.draws), (2, 60));
        assert!(sigma.values.iter().all(|s| *s > 0.0));
        for stat in ["diverging", "acceptance_rate", "step_size", "tree_depth", "n_steps", "energy", "lp"] {
            assert!(traces.posterior.get(GroupKind::SampleStats, stat).is_some(), "{stat}");
        }
        assert!(traces.posterior.has_group(GroupKind::ObservedData));

        let pp = traces
            .posterior_prediction
            .get(GroupKind::PosteriorPredictive, "O")
            .unwrap();
        assert_eq!((pp.chains, pp.draws, pp.shape.clone()), (2, 60, vec![12]));

        let err = run.persist(dir.path(), &ctx).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }
}
