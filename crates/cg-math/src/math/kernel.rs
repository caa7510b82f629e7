//! Squared-exponential covariance for the spatial latent term.
//!
//! `K = eta_sq * exp(-rho_sq * d^2) + nugget * I`, and the log density of a
//! zero-mean multivariate normal under `K` together with its gradients in the
//! latent vector and both kernel hyper-parameters.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use super::error::MathError;

const LOG_2PI: f64 = 1.837_877_066_409_345_5;

/// Kernel hyper-parameters plus the diagonal nugget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquaredExponential {
    pub eta_sq: f64,
    pub rho_sq: f64,
    pub nugget: f64,
}

impl SquaredExponential {
    pub fn new(eta_sq: f64, rho_sq: f64, nugget: f64) -> Self {
        Self {
            eta_sq,
            rho_sq,
            nugget,
        }
    }

    /// Covariance over squared distances.
    pub fn covariance(&self, dist_sq: &DMatrix<f64>) -> DMatrix<f64> {
        let n = dist_sq.nrows();
        DMatrix::from_fn(n, n, |i, j| {
            let k = self.eta_sq * (-self.rho_sq * dist_sq[(i, j)]).exp();
            if i == j {
                k + self.nugget
            } else {
                k
            }
        })
    }
}

/// Element-wise square of a distance matrix.
pub fn squared(d: &DMatrix<f64>) -> DMatrix<f64> {
    d.map(|v| v * v)
}

/// Cholesky factorisation, or `NotPositiveDefinite`.
pub fn cholesky(k: DMatrix<f64>) -> Result<Cholesky<f64, Dyn>, MathError> {
    let n = k.nrows();
    k.cholesky()
        .ok_or_else(|| MathError::NotPositiveDefinite(format!("{n}x{n} covariance")))
}

/// Smallest eigenvalue of a symmetric matrix.
pub fn min_eigenvalue(k: &DMatrix<f64>) -> f64 {
    k.clone()
        .symmetric_eigenvalues()
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

/// Draw `L z` for a factorised covariance and standard-normal `z`.
pub fn correlate(chol: &Cholesky<f64, Dyn>, z: &DVector<f64>) -> DVector<f64> {
    chol.l() * z
}

/// Log density of `gamma ~ MvNormal(0, K)` and its partial derivatives.
#[derive(Debug, Clone)]
pub struct GpDensity {
    pub log_density: f64,
    /// d/d gamma
    pub d_gamma: DVector<f64>,
    pub d_eta_sq: f64,
    pub d_rho_sq: f64,
}

/// Evaluate the latent-field density. `None` when `K` cannot be factorised.
///
/// Uses `d/dθ = -½ tr(K⁻¹ ∂K) + ½ αᵀ ∂K α` with `α = K⁻¹ γ`.
pub fn gp_log_density(
    gamma: &DVector<f64>,
    dist_sq: &DMatrix<f64>,
    kernel: &SquaredExponential,
) -> Option<GpDensity> {
    let n = gamma.len();
    let unit = dist_sq.map(|v| (-kernel.rho_sq * v).exp());
    let mut k = unit.map(|v| v * kernel.eta_sq);
    for i in 0..n {
        k[(i, i)] += kernel.nugget;
    }
    let chol = k.cholesky()?;
    let alpha = chol.solve(gamma);
    let log_det = 2.0 * chol.l_dirty().diagonal().iter().map(|v| v.ln()).sum::<f64>();
    let quad = gamma.dot(&alpha);
    let log_density = -0.5 * (log_det + quad + n as f64 * LOG_2PI);
    if !log_density.is_finite() {
        return None;
    }

    let k_inv = chol.inverse();
    let mut tr_e = 0.0;
    let mut tr_f = 0.0;
    let mut quad_e = 0.0;
    let mut quad_f = 0.0;
    for j in 0..n {
        for i in 0..n {
            let e = unit[(i, j)];
            let f = -kernel.eta_sq * dist_sq[(i, j)] * e;
            let kij = k_inv[(i, j)];
            let aa = alpha[i] * alpha[j];
            tr_e += kij * e;
            tr_f += kij * f;
            quad_e += aa * e;
            quad_f += aa * f;
        }
    }

    Some(GpDensity {
        log_density,
        d_gamma: -alpha,
        d_eta_sq: 0.5 * (quad_e - tr_e),
        d_rho_sq: 0.5 * (quad_f - tr_f),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::distance::{pairwise_distances, Point};

    fn grid() -> DMatrix<f64> {
        let pts: Vec<Point> = (0..6)
            .map(|i| Point::new((i % 3) as f64 * 0.4, (i / 3) as f64 * 0.7))
            .collect();
        squared(&pairwise_distances(&pts))
    }

    #[test]
    fn covariance_with_nugget_is_positive_definite() {
        let pts: Vec<Point> = (0..20).map(|i| Point::new(i as f64 * 1e-3, 0.0)).collect();
        let d2 = squared(&pairwise_distances(&pts));
        let k = SquaredExponential::new(2.0, 1.0, 0.01).covariance(&d2);
        assert!(min_eigenvalue(&k) >= -1e-10);
        assert!(cholesky(k).is_ok());
    }

    #[test]
    fn singular_covariance_is_reported() {
        let d2 = DMatrix::zeros(3, 3);
        let k = SquaredExponential::new(1.0, 1.0, 0.0).covariance(&d2);
        assert!(matches!(cholesky(k), Err(MathError::NotPositiveDefinite(_))));
    }

    #[test]
    fn density_matches_direct_formula_for_one_point() {
        let d2 = DMatrix::zeros(1, 1);
        let kernel = SquaredExponential::new(1.5, 2.0, 0.5);
        let g = DVector::from_vec(vec![0.7]);
        let out = gp_log_density(&g, &d2, &kernel).unwrap();
        let var: f64 = 2.0;
        let expected = -0.5 * (var.ln() + 0.49 / var + LOG_2PI);
        assert!((out.log_density - expected).abs() < 1e-12);
        assert!((out.d_gamma[0] + 0.7 / var).abs() < 1e-12);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let d2 = grid();
        let gamma = DVector::from_vec(vec![0.3, -0.2, 0.5, 0.1, -0.4, 0.25]);
        let kernel = SquaredExponential::new(0.8, 1.3, 0.01);
        let out = gp_log_density(&gamma, &d2, &kernel).unwrap();
        let h = 1e-6;

        let lp = |k: SquaredExponential, g: &DVector<f64>| {
            gp_log_density(g, &d2, &k).unwrap().log_density
        };
        let fd_eta = (lp(SquaredExponential { eta_sq: 0.8 + h, ..kernel }, &gamma)
            - lp(SquaredExponential { eta_sq: 0.8 - h, ..kernel }, &gamma))
            / (2.0 * h);
        let fd_rho = (lp(SquaredExponential { rho_sq: 1.3 + h, ..kernel }, &gamma)
            - lp(SquaredExponential { rho_sq: 1.3 - h, ..kernel }, &gamma))
            / (2.0 * h);
        assert!((out.d_eta_sq - fd_eta).abs() < 1e-4, "{} vs {}", out.d_eta_sq, fd_eta);
        assert!((out.d_rho_sq - fd_rho).abs() < 1e-4, "{} vs {}", out.d_rho_sq, fd_rho);

        for i in 0..gamma.len() {
            let mut up = gamma.clone();
            let mut down = gamma.clone();
            up[i] += h;
            down[i] -= h;
            let fd = (lp(kernel, &up) - lp(kernel, &down)) / (2.0 * h);
            assert!((out.d_gamma[i] - fd).abs() < 1e-4);
        }
    }
}
