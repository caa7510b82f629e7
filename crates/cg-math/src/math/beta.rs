//! Beta distribution in the mean/concentration parameterisation.
//!
//! The bounded-outcome model writes `y ~ Beta(m * phi, (1 - m) * phi)` with
//! mean `m` in (0, 1) and concentration `phi > 0`. Gradients are returned with
//! respect to `m` and `phi` so callers can chain through their own links.

use super::stable::{digamma, log_beta};

/// Shape parameters `(a, b)` for mean `m` and concentration `phi`.
pub fn shape_from_mean(m: f64, phi: f64) -> (f64, f64) {
    (m * phi, (1.0 - m) * phi)
}

/// Log density and its partial derivatives in the mean/concentration form.
///
/// Returns `(log_pdf, d/dm, d/dphi)`. `y` must lie strictly inside (0, 1).
pub fn log_beta_pdf_mean_grad(y: f64, m: f64, phi: f64) -> (f64, f64, f64) {
    let (a, b) = shape_from_mean(m, phi);
    let log_y = y.ln();
    let log_1my = (-y).ln_1p();
    let lp = (a - 1.0) * log_y + (b - 1.0) * log_1my - log_beta(a, b);
    let psi_phi = digamma(phi);
    let dlda = log_y - digamma(a) + psi_phi;
    let dldb = log_1my - digamma(b) + psi_phi;
    let d_m = phi * (dlda - dldb);
    let d_phi = m * dlda + (1.0 - m) * dldb;
    (lp, d_m, d_phi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        (a - b).abs() <= tol
    }

    #[test]
    fn mean_form_agrees_with_shape_form() {
        let (a, b) = shape_from_mean(0.3, 12.0);
        assert!(approx_eq(a, 3.6, 1e-12));
        assert!(approx_eq(b, 8.4, 1e-12));
        // Beta(2, 5) at 0.2 has density 30 * 0.2 * 0.8^4.
        let (lp, _, _) = log_beta_pdf_mean_grad(0.2, 2.0 / 7.0, 7.0);
        assert!(approx_eq(lp, 2.4576f64.ln(), 1e-6));
        // Beta(1, 1) is uniform.
        let (flat, _, _) = log_beta_pdf_mean_grad(0.33, 0.5, 2.0);
        assert!(approx_eq(flat, 0.0, 1e-12));
    }

    #[test]
    fn mean_form_gradient_matches_finite_difference() {
        let (y, m, phi) = (0.18, 0.25, 7.5);
        let (_, d_m, d_phi) = log_beta_pdf_mean_grad(y, m, phi);
        let h = 1e-6;
        let fd_m = (log_beta_pdf_mean_grad(y, m + h, phi).0
            - log_beta_pdf_mean_grad(y, m - h, phi).0)
            / (2.0 * h);
        let fd_phi = (log_beta_pdf_mean_grad(y, m, phi + h).0
            - log_beta_pdf_mean_grad(y, m, phi - h).0)
            / (2.0 * h);
        assert!(approx_eq(d_m, fd_m, 1e-5), "{d_m} vs {fd_m}");
        assert!(approx_eq(d_phi, fd_phi, 1e-5), "{d_phi} vs {fd_phi}");
    }
}
