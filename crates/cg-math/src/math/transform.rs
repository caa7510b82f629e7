//! Missing-aware transforms for census covariates.
//!
//! A missing input or an undefined result is `None`. Nothing in this module
//! produces `-inf`, NaN, or a zero placeholder.

use serde::{Deserialize, Serialize};

/// `ln(x)` when `x` is finite and positive, otherwise missing.
pub fn log_or_missing(x: f64) -> Option<f64> {
    if x.is_finite() && x > 0.0 {
        Some(x.ln())
    } else {
        None
    }
}

/// `a / b`, missing when `b == 0` or the quotient is not finite.
pub fn ratio_or_missing(a: f64, b: f64) -> Option<f64> {
    if b == 0.0 {
        return None;
    }
    let r = a / b;
    r.is_finite().then_some(r)
}

/// Location and scale of a column, used to z-score model inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: f64,
    pub sd: f64,
}

impl Standardizer {
    /// Fit on a column. `None` for fewer than two values or zero spread.
    ///
    /// Uses the population standard deviation.
    pub fn fit(values: &[f64]) -> Option<Self> {
        if values.len() < 2 {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let sd = var.sqrt();
        (sd.is_finite() && sd > 0.0).then_some(Standardizer { mean, sd })
    }

    pub fn apply(&self, x: f64) -> f64 {
        (x - self.mean) / self.sd
    }

    pub fn invert(&self, z: f64) -> f64 {
        z * self.sd + self.mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_of_non_positive_is_missing() {
        assert_eq!(log_or_missing(0.0), None);
        assert_eq!(log_or_missing(-3.0), None);
        assert_eq!(log_or_missing(f64::NAN), None);
        assert_eq!(log_or_missing(f64::INFINITY), None);
        assert_eq!(log_or_missing(1.0), Some(0.0));
    }

    #[test]
    fn ratio_with_zero_denominator_is_missing() {
        assert_eq!(ratio_or_missing(3.0, 0.0), None);
        assert_eq!(ratio_or_missing(0.0, 0.0), None);
        assert_eq!(ratio_or_missing(3.0, 4.0), Some(0.75));
        assert_eq!(ratio_or_missing(f64::NAN, 2.0), None);
    }

    #[test]
    fn standardizer_round_trips() {
        let s = Standardizer::fit(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((s.mean - 2.5).abs() < 1e-12);
        assert!((s.invert(s.apply(3.7)) - 3.7).abs() < 1e-12);
        assert!(Standardizer::fit(&[5.0, 5.0, 5.0]).is_none());
        assert!(Standardizer::fit(&[5.0]).is_none());
    }
}
