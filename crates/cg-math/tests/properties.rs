//! Property-based tests for cg-math numerical functions.
//!
//! Uses proptest to verify mathematical properties hold across many random inputs.

use proptest::prelude::*;
use cg_math::{
    digamma, hdi, log_gamma, log_add_exp, log_or_missing, min_eigenvalue, nearest_distances,
    pairwise_distances, ratio_or_missing, squared, subsample, Point, SquaredExponential,
};

/// Tolerance for floating point comparisons.
const TOL: f64 = 1e-10;

/// Extended tolerance for log_gamma where Lanczos approximation has some error.
const LGAMMA_TOL: f64 = 1e-8;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return false;
    }
    (a - b).abs() <= tol.max(tol * a.abs().max(b.abs()))
}

fn points(max_len: usize) -> impl Strategy<Value = Vec<Point>> {
    prop::collection::vec(
        (-5_000.0..5_000.0f64, -5_000.0..5_000.0f64).prop_map(|(x, y)| Point::new(x, y)),
        1..max_len,
    )
}

// ============================================================================
// Missing-aware transforms
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// The log of a non-positive value is missing, never -inf.
    #[test]
    fn log_of_non_positive_is_missing(x in -1e6..=0.0f64) {
        prop_assert_eq!(log_or_missing(x), None);
    }

    /// The log of a positive value is present and finite.
    #[test]
    fn log_of_positive_is_finite(x in 1e-300..1e300f64) {
        let v = log_or_missing(x);
        prop_assert!(v.is_some_and(f64::is_finite));
    }

    /// A count ratio with numerator <= denominator lies in [0, 1].
    #[test]
    fn proportion_is_bounded(pop in 1.0..1e5f64, frac in 0.0..=1.0f64) {
        let orthodox = (pop * frac).floor();
        let p = ratio_or_missing(orthodox, pop).unwrap();
        prop_assert!((0.0..=1.0).contains(&p));
    }

    /// A zero denominator is always missing.
    #[test]
    fn zero_denominator_is_missing(a in -1e6..1e6f64) {
        prop_assert_eq!(ratio_or_missing(a, 0.0), None);
    }
}

// ============================================================================
// Distances
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Pairwise distances are symmetric, non-negative, zero on the diagonal.
    #[test]
    fn pairwise_symmetric_zero_diagonal(pts in points(30)) {
        let d = pairwise_distances(&pts);
        for i in 0..pts.len() {
            prop_assert_eq!(d[(i, i)], 0.0);
            for j in 0..pts.len() {
                prop_assert_eq!(d[(i, j)], d[(j, i)]);
                prop_assert!(d[(i, j)] >= 0.0);
            }
        }
    }

    /// Subsampling then computing equals computing then selecting.
    #[test]
    fn subsample_commutes_with_distances(pts in points(40), stride in 1usize..6) {
        let direct = pairwise_distances(&subsample(&pts, stride));
        let full = pairwise_distances(&pts);
        let idx: Vec<usize> = (0..pts.len()).step_by(stride).collect();
        prop_assert_eq!(direct.nrows(), idx.len());
        for (a, ia) in idx.iter().enumerate() {
            for (b, ib) in idx.iter().enumerate() {
                prop_assert_eq!(direct[(a, b)], full[(*ia, *ib)]);
            }
        }
    }

    /// A point that coincides with a reference is at distance zero.
    #[test]
    fn nearest_is_zero_for_reference_points(refs in points(10)) {
        let d = nearest_distances(&refs, &refs).unwrap();
        prop_assert!(d.iter().all(|v| *v == 0.0));
    }

    /// Nearest distances are whole numbers.
    #[test]
    fn nearest_is_rounded(pts in points(20), refs in points(5)) {
        for v in nearest_distances(&pts, &refs).unwrap() {
            prop_assert_eq!(v, v.round());
        }
    }
}

// ============================================================================
// Spatial covariance
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The kernel plus nugget is positive semi-definite.
    #[test]
    fn covariance_is_psd(
        pts in points(25),
        eta_sq in 0.01..5.0f64,
        rho_sq in 0.01..5.0f64,
    ) {
        let scaled: Vec<Point> = pts.iter().map(|p| p.scaled(1000.0)).collect();
        let d2 = squared(&pairwise_distances(&scaled));
        let k = SquaredExponential::new(eta_sq, rho_sq, 0.01).covariance(&d2);
        let min = min_eigenvalue(&k);
        prop_assert!(min >= -1e-8, "min eigenvalue {}", min);
    }
}

// ============================================================================
// Special functions
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// log_add_exp is commutative: order doesn't matter.
    #[test]
    fn log_add_exp_commutative(a in -100.0..100.0f64, b in -100.0..100.0f64) {
        let ab = log_add_exp(a, b);
        let ba = log_add_exp(b, a);
        prop_assert!(approx_eq(ab, ba, TOL));
    }

    /// log_add_exp never overflows for large inputs.
    #[test]
    fn log_add_exp_no_overflow(a in 500.0..700.0f64, b in 500.0..700.0f64) {
        let result = log_add_exp(a, b);
        prop_assert!(result.is_finite());
        prop_assert!(result >= a.max(b));
    }

    /// Gamma recurrence: log Gamma(z+1) = log Gamma(z) + log(z).
    #[test]
    fn log_gamma_recurrence(z in 1.0..100.0f64) {
        let lhs = log_gamma(z + 1.0);
        let rhs = log_gamma(z) + z.ln();
        prop_assert!(approx_eq(lhs, rhs, LGAMMA_TOL));
    }

    /// Digamma recurrence: psi(x+1) = psi(x) + 1/x.
    #[test]
    fn digamma_recurrence(x in 0.05..200.0f64) {
        let lhs = digamma(x + 1.0);
        let rhs = digamma(x) + 1.0 / x;
        prop_assert!(approx_eq(lhs, rhs, 1e-9));
    }
}

// ============================================================================
// Intervals
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// The HDI lies within the sample range and covers at least `prob` of it.
    #[test]
    fn hdi_covers_requested_mass(
        values in prop::collection::vec(-100.0..100.0f64, 10..200),
        prob in 0.5..0.99f64,
    ) {
        let (lo, hi) = hdi(&values, prob);
        prop_assert!(lo <= hi);
        let inside = values.iter().filter(|v| **v >= lo && **v <= hi).count();
        prop_assert!(inside as f64 >= (prob * values.len() as f64).floor());
    }
}
