//! Euclidean distances over projected (metric) coordinates.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::error::MathError;

/// A point in a projected metric coordinate system (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Both coordinates divided by `factor`.
    pub fn scaled(&self, factor: f64) -> Point {
        Point::new(self.x / factor, self.y / factor)
    }
}

/// Symmetric `N×N` matrix of pairwise distances with an exact zero diagonal.
pub fn pairwise_distances(points: &[Point]) -> DMatrix<f64> {
    let n = points.len();
    let mut out = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = points[i].distance(&points[j]);
            out[(i, j)] = d;
            out[(j, i)] = d;
        }
    }
    out
}

/// Distance from each point to its nearest reference point, rounded to the
/// nearest whole unit (ties to even).
pub fn nearest_distances(points: &[Point], references: &[Point]) -> Result<Vec<f64>, MathError> {
    if references.is_empty() {
        return Err(MathError::NoReferencePoints);
    }
    Ok(points
        .iter()
        .map(|p| {
            references
                .iter()
                .map(|r| p.distance(r))
                .fold(f64::INFINITY, f64::min)
                .round_ties_even()
        })
        .collect())
}

/// Every `stride`-th element, starting at the first.
pub fn subsample<T: Clone>(values: &[T], stride: usize) -> Vec<T> {
    values.iter().step_by(stride.max(1)).cloned().collect()
}

/// Check that `d` is a finite, symmetric `n×n` matrix with zero diagonal.
pub fn validate_distance_matrix(d: &DMatrix<f64>, n: usize) -> Result<(), MathError> {
    if d.nrows() != n {
        return Err(MathError::Dimension {
            what: "distance matrix rows",
            expected: n,
            actual: d.nrows(),
        });
    }
    if d.ncols() != n {
        return Err(MathError::Dimension {
            what: "distance matrix columns",
            expected: n,
            actual: d.ncols(),
        });
    }
    for i in 0..n {
        if d[(i, i)] != 0.0 {
            return Err(MathError::InvalidDistanceMatrix(format!(
                "diagonal entry {} is {}",
                i,
                d[(i, i)]
            )));
        }
        for j in (i + 1)..n {
            let (a, b) = (d[(i, j)], d[(j, i)]);
            if !a.is_finite() || a < 0.0 {
                return Err(MathError::InvalidDistanceMatrix(format!(
                    "entry ({}, {}) is {}",
                    i, j, a
                )));
            }
            if (a - b).abs() > 1e-9 * a.abs().max(1.0) {
                return Err(MathError::InvalidDistanceMatrix(format!(
                    "not symmetric at ({}, {}): {} vs {}",
                    i, j, a, b
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairwise_is_symmetric_with_zero_diagonal() {
        let pts = [Point::new(0.0, 0.0), Point::new(3.0, 4.0), Point::new(-1.0, 2.0)];
        let d = pairwise_distances(&pts);
        assert_eq!(d[(0, 1)], 5.0);
        assert_eq!(d, d.transpose());
        for i in 0..3 {
            assert_eq!(d[(i, i)], 0.0);
        }
        validate_distance_matrix(&d, 3).unwrap();
    }

    #[test]
    fn nearest_is_zero_when_colocated() {
        let pts = [Point::new(10.0, 10.0), Point::new(13.0, 14.0)];
        let refs = [Point::new(10.0, 10.0), Point::new(100.0, 100.0)];
        assert_eq!(nearest_distances(&pts, &refs).unwrap(), vec![0.0, 5.0]);
    }

    #[test]
    fn nearest_rounds_half_to_even() {
        let refs = [Point::new(0.0, 0.0)];
        let pts = [Point::new(2.5, 0.0), Point::new(3.5, 0.0), Point::new(0.4, 0.0)];
        assert_eq!(nearest_distances(&pts, &refs).unwrap(), vec![2.0, 4.0, 0.0]);
    }

    #[test]
    fn nearest_without_references_fails() {
        let pts = [Point::new(0.0, 0.0)];
        assert_eq!(
            nearest_distances(&pts, &[]),
            Err(MathError::NoReferencePoints)
        );
    }

    #[test]
    fn subsampled_matrix_matches_direct_computation() {
        let pts: Vec<Point> = (0..11).map(|i| Point::new(i as f64, (i * i) as f64)).collect();
        let sub = subsample(&pts, 3);
        assert_eq!(sub.len(), 4);
        let direct = pairwise_distances(&sub);
        let full = pairwise_distances(&pts);
        for (a, ia) in [0usize, 3, 6, 9].iter().enumerate() {
            for (b, ib) in [0usize, 3, 6, 9].iter().enumerate() {
                assert_eq!(direct[(a, b)], full[(*ia, *ib)]);
            }
        }
    }

    #[test]
    fn rejects_bad_matrices() {
        let mut d = pairwise_distances(&[Point::new(0.0, 0.0), Point::new(1.0, 0.0)]);
        assert!(validate_distance_matrix(&d, 3).is_err());
        d[(0, 1)] = 2.0;
        assert!(validate_distance_matrix(&d, 2).is_err());
        d[(0, 1)] = 1.0;
        d[(1, 1)] = 0.5;
        assert!(validate_distance_matrix(&d, 2).is_err());
    }
}
