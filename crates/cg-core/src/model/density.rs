//! Joint log density over the unconstrained parameter vector, with analytic
//! gradients.

use cg_math::{gp_log_density, log_beta_pdf_mean_grad, sigmoid, SquaredExponential};
use nalgebra::DVector;

use super::spec::{Likelihood, ModelSpec, Pooling, ScalePrior, Term};
use crate::inference::LogDensity;

const LN_2PI: f64 = 1.837_877_066_409_345_5;
const LN_2: f64 = std::f64::consts::LN_2;

/// Keeps the Beta mean away from the boundary.
const MEAN_EPS: f64 = 1e-12;

impl ScalePrior {
    /// Log density of `s = exp(u)` including the Jacobian, and `d/du`.
    pub fn log_density_unconstrained(&self, u: f64) -> (f64, f64) {
        let s = u.exp();
        match *self {
            ScalePrior::Exponential { rate } => (rate.ln() - rate * s + u, 1.0 - rate * s),
            ScalePrior::HalfNormal { sd } => {
                let z = s / sd;
                (
                    LN_2 - sd.ln() - 0.5 * LN_2PI - 0.5 * z * z + u,
                    1.0 - z * z,
                )
            }
        }
    }
}

/// `ln N(x | mean, var)` and its derivative in `x`.
fn normal_term(x: f64, mean: f64, var: f64) -> (f64, f64) {
    let r = x - mean;
    (-0.5 * (LN_2PI + var.ln() + r * r / var), -r / var)
}

impl ModelSpec {
    /// Log density at `q`, writing the gradient into `grad`.
    ///
    /// Returns `-inf` (gradient unspecified) where the density is undefined,
    /// including a latent-field covariance that cannot be factorised.
    pub fn log_density_and_gradient(&self, q: &[f64], grad: &mut [f64]) -> f64 {
        grad.iter_mut().for_each(|g| *g = 0.0);
        let mut lp = 0.0;

        for (e, eq) in self.equations.iter().enumerate() {
            let slots = self.slots[e];
            let p = eq.terms.len();
            match (&eq.pooling, slots.theta) {
                (Pooling::Pooled { prior_var }, _) => {
                    for (j, var) in prior_var.iter().enumerate() {
                        let (l, d) = normal_term(q[slots.beta + j], 0.0, *var);
                        lp += l;
                        grad[slots.beta + j] += d;
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
                        let t = q[theta + j];
                        let (l, d) = normal_term(t, 0.0, hyper_var[j]);
                        lp += l;
                        grad[theta + j] += d;
                        for g in 0..self.k {
                            let idx = slots.beta + g * p + j;
                            let (l, d) = normal_term(q[idx], t, group_var[j]);
                            lp += l;
                            grad[idx] += d;
                            grad[theta + j] -= d;
                        }
                    }
                }
                (Pooling::Hierarchical { .. }, None) => return f64::NEG_INFINITY,
            }

            let (l, d) = eq.likelihood.scale_prior().log_density_unconstrained(q[slots.scale]);
            lp += l;
            grad[slots.scale] += d;
        }

        if let (Some(sp), Some(ss)) = (&self.spatial, self.spatial_slots) {
            let (l, d) = sp.eta_sq_prior.log_density_unconstrained(q[ss.eta_sq]);
            lp += l;
            grad[ss.eta_sq] += d;
            let (l, d) = sp.rho_sq_prior.log_density_unconstrained(q[ss.rho_sq]);
            lp += l;
            grad[ss.rho_sq] += d;

            let eta_sq = q[ss.eta_sq].exp();
            let rho_sq = q[ss.rho_sq].exp();
            let gamma = DVector::from_column_slice(&q[ss.gamma..ss.gamma + self.n]);
            let kernel = SquaredExponential::new(eta_sq, rho_sq, sp.nugget);
            let Some(gp) = gp_log_density(&gamma, &sp.dist_sq, &kernel) else {
                return f64::NEG_INFINITY;
            };
            lp += gp.log_density;
            for (i, d) in gp.d_gamma.iter().enumerate() {
                grad[ss.gamma + i] += d;
            }
            grad[ss.eta_sq] += gp.d_eta_sq * eta_sq;
            grad[ss.rho_sq] += gp.d_rho_sq * rho_sq;
        }

        let mu = self.linear_predictors(q);
        let mut adj: Vec<Vec<f64>> = vec![vec![0.0; self.n]; self.equations.len()];

        for (e, eq) in self.equations.iter().enumerate() {
            let u = q[self.slots[e].scale];
            let scale = u.exp();
            let y = self.observed(e);
            let mut d_u = 0.0;
            match eq.likelihood {
                Likelihood::Normal { .. } => {
                    let inv_var = 1.0 / (scale * scale);
                    for i in 0..self.n {
                        let r = y[i] - mu[e][i];
                        let r2 = r * r * inv_var;
                        lp += -0.5 * LN_2PI - u - 0.5 * r2;
                        adj[e][i] = r * inv_var;
                        d_u += r2 - 1.0;
                    }
                }
                Likelihood::Beta { .. } => {
                    for i in 0..self.n {
                        let m = sigmoid(mu[e][i]).clamp(MEAN_EPS, 1.0 - MEAN_EPS);
                        let (l, d_m, d_phi) = log_beta_pdf_mean_grad(y[i], m, scale);
                        lp += l;
                        adj[e][i] = d_m * m * (1.0 - m);
                        d_u += d_phi * scale;
                    }
                }
            }
            grad[self.slots[e].scale] += d_u;
        }

        // Reverse sweep: later equations feed adjoints back into the ones
        // whose linear predictor they use.
        let gamma_offset = self.spatial_slots.map(|s| s.gamma);
        for (e, eq) in self.equations.iter().enumerate().rev() {
            for i in 0..self.n {
                let a = adj[e][i];
                if a == 0.0 {
                    continue;
                }
                for (j, term) in eq.terms.iter().enumerate() {
                    let bi = self.beta_index(e, i, j);
                    grad[bi] += a * self.term_value(term, i, &mu);
                    if let Term::LatentMean(r) = term {
                        adj[*r][i] += a * q[bi];
                    }
                }
                if let (true, Some(g)) = (eq.spatial, gamma_offset) {
                    grad[g + i] += a;
                }
            }
        }

        if lp.is_finite() && grad.iter().all(|g| g.is_finite()) {
            lp
        } else {
            f64::NEG_INFINITY
        }
    }
}

impl LogDensity for ModelSpec {
    fn dim(&self) -> usize {
        self.layout.dim()
    }

    fn log_density_and_gradient(&self, q: &[f64], grad: &mut [f64]) -> f64 {
        ModelSpec::log_density_and_gradient(self, q, grad)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::covariates::Covariate;
    use crate::model::spec::{Equation, SpatialTerm};
    use cg_config::ModelVariant;
    use cg_math::{pairwise_distances, Point};

    fn check_gradient(spec: &ModelSpec, q: &[f64]) {
        let mut grad = vec![0.0; spec.dim()];
        let lp = spec.log_density_and_gradient(q, &mut grad);
        assert!(lp.is_finite(), "lp = {lp}");
        let h = 1e-6;
        let mut scratch = vec![0.0; spec.dim()];
        for k in 0..spec.dim() {
            let mut hi = q.to_vec();
            let mut lo = q.to_vec();
            hi[k] += h;
            lo[k] -= h;
            let fd = (spec.log_density_and_gradient(&hi, &mut scratch)
                - spec.log_density_and_gradient(&lo, &mut scratch))
                / (2.0 * h);
            let tol = 1e-4 * fd.abs().max(1.0);
            assert!(
                (fd - grad[k]).abs() < tol,
                "coordinate {k}: analytic {} vs numeric {}",
                grad[k],
                fd
            );
        }
    }

    fn two_stage(pooling: impl Fn(usize) -> Pooling) -> ModelSpec {
        let n = 6;
        let mut cols = BTreeMap::new();
        cols.insert(Covariate::EstateIncomeLn, (0..n).map(|i| (i as f64 - 2.5) * 0.4).collect());
        cols.insert(
            Covariate::IncomePerCapitaLn,
            vec![0.3, -0.1, 0.5, 0.9, -0.4, 0.2],
        );
        cols.insert(
            Covariate::OrthodoxProportionLn,
            vec![-1.2, -0.8, -2.0, -1.5, -0.3, -1.1],
        );
        let normal = Likelihood::Normal {
            sigma_prior: ScalePrior::Exponential { rate: 1.0 },
        };
        let eqs = vec![
            Equation {
                name: "P".to_string(),
                outcome: Covariate::IncomePerCapitaLn,
                terms: vec![Term::Intercept, Term::Covariate(Covariate::EstateIncomeLn)],
                pooling: pooling(2),
                spatial: false,
                likelihood: normal,
            },
            Equation {
                name: "O".to_string(),
                outcome: Covariate::OrthodoxProportionLn,
                terms: vec![
                    Term::Intercept,
                    Term::Covariate(Covariate::EstateIncomeLn),
                    Term::LatentMean(0),
                ],
                pooling: pooling(3),
                spatial: false,
                likelihood: normal,
            },
        ];
        ModelSpec::new(
            ModelVariant::HierarchicalTwoStage,
            vec![0, 1, 0, 1, 1, 0],
            2,
            cols,
            eqs,
            None,
        )
        .unwrap()
    }

    fn wiggle(dim: usize) -> Vec<f64> {
        (0..dim).map(|i| ((i * 37 % 11) as f64 - 5.0) * 0.07).collect()
    }

    #[test]
    fn pooled_two_stage_gradient_matches_finite_differences() {
        let spec = two_stage(|p| Pooling::Pooled {
            prior_var: vec![0.1; p],
        });
        check_gradient(&spec, &wiggle(spec.dim()));
    }

    #[test]
    fn hierarchical_two_stage_gradient_matches_finite_differences() {
        let spec = two_stage(|p| Pooling::Hierarchical {
            hyper_var: vec![0.1; p],
            group_var: vec![0.01; p],
        });
        check_gradient(&spec, &wiggle(spec.dim()));
    }

    #[test]
    fn spatial_beta_gradient_matches_finite_differences() {
        let n = 5;
        let pts: Vec<Point> = (0..n)
            .map(|i| Point::new((i % 3) as f64 * 0.5, (i / 3) as f64 * 0.8))
            .collect();
        let mut cols = BTreeMap::new();
        cols.insert(Covariate::EstateIncomeLn, vec![0.1, -0.3, 0.7, 0.0, -1.0]);
        cols.insert(Covariate::OrthodoxProportion, vec![0.2, 0.05, 0.4, 0.3, 0.1]);
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
                phi_prior: ScalePrior::HalfNormal { sd: 10.0 },
            },
        };
        let sp = SpatialTerm::from_distances(
            &pairwise_distances(&pts),
            ScalePrior::Exponential { rate: 1.0 },
            ScalePrior::Exponential { rate: 1.0 },
            0.01,
        );
        let spec = ModelSpec::new(
            ModelVariant::HierarchicalSpatialBeta,
            vec![0, 0, 1, 1, 1],
            2,
            cols,
            vec![eq],
            Some(sp),
        )
        .unwrap();
        let mut q = wiggle(spec.dim());
        let phi = spec.layout.block("phi_O").unwrap().offset;
        q[phi] = 2.0;
        check_gradient(&spec, &q);
    }

    #[test]
    fn scale_prior_densities_match_closed_forms() {
        let (lp, d) = ScalePrior::Exponential { rate: 2.0 }.log_density_unconstrained(0.0);
        assert!((lp - (2.0f64.ln() - 2.0)).abs() < 1e-12);
        assert!((d + 1.0).abs() < 1e-12);
        let (_, d) = ScalePrior::HalfNormal { sd: 1.0 }.log_density_unconstrained(0.0);
        assert!(d.abs() < 1e-12);
    }
}
