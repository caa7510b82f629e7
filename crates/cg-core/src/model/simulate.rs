//! Forward simulation: parameters from their priors and outcomes given
//! parameters.

use cg_common::{Error, Result};
use cg_math::{cholesky, correlate, shape_from_mean, sigmoid, SquaredExponential};
use nalgebra::DVector;
use rand::Rng;
use rand_distr::{Beta, Distribution, Exp, StandardNormal};

use super::spec::{Likelihood, ModelSpec, Pooling, ScalePrior};

const MEAN_EPS: f64 = 1e-12;

fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    StandardNormal.sample(rng)
}

impl ScalePrior {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        match *self {
            ScalePrior::Exponential { rate } => Exp::new(rate)
                .map(|d| d.sample(rng))
                .map_err(|e| Error::NumericalInstability(format!("exponential prior: {e}"))),
            ScalePrior::HalfNormal { sd } => Ok((sd * standard_normal(rng)).abs()),
        }
    }
}

impl ModelSpec {
    /// Draw every free parameter from its prior. Returns constrained values
    /// in layout order.
    pub fn sample_parameters<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f64>> {
        let mut values = vec![0.0; self.dim()];
        for (e, eq) in self.equations.iter().enumerate() {
            let slots = self.slots[e];
            let p = eq.terms.len();
            match (&eq.pooling, slots.theta) {
                (Pooling::Pooled { prior_var }, _) => {
                    for (j, var) in prior_var.iter().enumerate() {
                        values[slots.beta + j] = var.sqrt() * standard_normal(rng);
                    }
                }
                (
                    Pooling::Hierarchical {
                        hyper_var,
                        group_var,
                    },
                    Some(theta),
                ) => {
                    for j in 0..p {
                        values[theta + j] = hyper_var[j].sqrt() * standard_normal(rng);
                    }
                    for g in 0..self.k {
                        for j in 0..p {
                            values[slots.beta + g * p + j] =
                                values[theta + j] + group_var[j].sqrt() * standard_normal(rng);
                        }
                    }
                }
                (Pooling::Hierarchical { .. }, None) => {
                    return Err(Error::Config(format!(
                        "equation {} has no hyper-prior slot",
                        eq.name
                    )))
                }
            }
            values[slots.scale] = eq.likelihood.scale_prior().sample(rng)?;
        }

        if let (Some(sp), Some(ss)) = (&self.spatial, self.spatial_slots) {
            let eta_sq = sp.eta_sq_prior.sample(rng)?;
            let rho_sq = sp.rho_sq_prior.sample(rng)?;
            values[ss.eta_sq] = eta_sq;
            values[ss.rho_sq] = rho_sq;
            let k = SquaredExponential::new(eta_sq, rho_sq, sp.nugget).covariance(&sp.dist_sq);
            let chol = cholesky(k)?;
            let z = DVector::from_fn(self.n, |_, _| standard_normal(rng));
            let gamma = correlate(&chol, &z);
            values[ss.gamma..ss.gamma + self.n].copy_from_slice(gamma.as_slice());
        }
        Ok(values)
    }

    /// Draw outcomes for every equation given constrained parameter values
    /// and their linear predictors.
    pub fn simulate_outcomes<R: Rng + ?Sized>(
        &self,
        values: &[f64],
        mu: &[Vec<f64>],
        rng: &mut R,
    ) -> Result<Vec<Vec<f64>>> {
        let mut out = Vec::with_capacity(self.equations.len());
        for (e, eq) in self.equations.iter().enumerate() {
            let scale = values[self.slots[e].scale];
            let draws = match eq.likelihood {
                Likelihood::Normal { .. } => mu[e]
                    .iter()
                    .map(|m| m + scale * standard_normal(rng))
                    .collect(),
                Likelihood::Beta { .. } => {
                    let mut draws = Vec::with_capacity(self.n);
                    for m in &mu[e] {
                        let mean = sigmoid(*m).clamp(MEAN_EPS, 1.0 - MEAN_EPS);
                        let (a, b) = shape_from_mean(mean, scale);
                        let dist = Beta::new(a, b).map_err(|err| {
                            Error::NumericalInstability(format!(
                                "Beta({a}, {b}) for {}: {err}",
                                eq.name
                            ))
                        })?;
                        draws.push(dist.sample(rng));
                    }
                    draws
                }
            };
            out.push(draws);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::covariates::Covariate;
    use crate::model::spec::{Equation, SpatialTerm, Term};
    use cg_config::ModelVariant;
    use cg_math::{pairwise_distances, Point};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn spatial_spec(nugget: f64, pts: &[Point]) -> cg_common::Result<ModelSpec> {
        let n = pts.len();
        let mut cols = BTreeMap::new();
        cols.insert(Covariate::EstateIncomeLn, (0..n).map(|i| i as f64 * 0.1).collect());
        cols.insert(Covariate::OrthodoxProportion, vec![0.25; n]);
        let eq = Equation {
            name: "O".to_string(),
            outcome: Covariate::OrthodoxProportion,
            terms: vec![Term::Intercept, Term::Covariate(Covariate::EstateIncomeLn)],
            pooling: Pooling::Hierarchical {
                hyper_var: vec![0.1, 0.1],
                group_var: vec![0.01, 0.01],
            },
            spatial: true,
            likelihood: Likelihood::Beta {
                phi_prior: ScalePrior::Exponential { rate: 0.1 },
            },
        };
        let sp = SpatialTerm::from_distances(
            &pairwise_distances(pts),
            ScalePrior::Exponential { rate: 1.0 },
            ScalePrior::Exponential { rate: 1.0 },
            nugget,
        );
        ModelSpec::new(ModelVariant::HierarchicalSpatialBeta, vec![0; n], 1, cols, vec![eq], Some(sp))
    }

    #[test]
    fn prior_draws_are_reproducible_and_positive() {
        let pts: Vec<Point> = (0..8).map(|i| Point::new(i as f64 * 0.3, 0.0)).collect();
        let spec = spatial_spec(0.01, &pts).unwrap();
        let a = spec.sample_parameters(&mut StdRng::seed_from_u64(42)).unwrap();
        let b = spec.sample_parameters(&mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
        for name in ["phi_O", "eta_sq", "rho_sq"] {
            let block = spec.layout.block(name).unwrap();
            assert!(a[block.offset] > 0.0, "{name}");
        }
    }

    #[test]
    fn beta_outcomes_stay_in_unit_interval() {
        let pts: Vec<Point> = (0..8).map(|i| Point::new(i as f64, 1.0)).collect();
        let spec = spatial_spec(0.01, &pts).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let values = spec.sample_parameters(&mut rng).unwrap();
            let mu = spec.linear_predictors(&values);
            let y = spec.simulate_outcomes(&values, &mu, &mut rng).unwrap();
            assert!(y[0].iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }
}
