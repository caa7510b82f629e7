//! Spatial grouping of parcels.
//!
//! Groups are either the administrative districts, numbered in first-seen
//! order, or k-means clusters of the parcel coordinates. Either way the
//! output labels are dense: every label in `0..K` occurs and
//! `K == max(label) + 1`.

use std::collections::HashMap;

use cg_common::{Error, Result};
use cg_config::{GroupingMethod, PipelineConfig};
use cg_math::Point;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Smallest and largest supported k-means cluster counts.
pub const MIN_CLUSTERS: usize = 5;
pub const MAX_CLUSTERS: usize = 25;

const MAX_ITER: usize = 300;
const TOLERANCE: f64 = 1e-4;

/// How to assign groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingStrategy {
    Administrative,
    KMeans {
        n_clusters: usize,
        restarts: usize,
        seed: u64,
    },
}

impl GroupingStrategy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        match config.grouping {
            GroupingMethod::Administrative => GroupingStrategy::Administrative,
            GroupingMethod::Kmeans => GroupingStrategy::KMeans {
                n_clusters: config.n_clusters,
                restarts: config.kmeans_restarts,
                seed: config.seed,
            },
        }
    }
}

/// Assigned labels and the number of groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    pub labels: Vec<usize>,
    pub n_groups: usize,
}

/// Assign a group to every parcel.
pub fn assign_groups(
    districts: &[&str],
    coords: &[Point],
    strategy: GroupingStrategy,
) -> Result<Grouping> {
    if districts.len() != coords.len() {
        return Err(Error::dimension("district labels", coords.len(), districts.len()));
    }
    let labels = match strategy {
        GroupingStrategy::Administrative => factorize(districts),
        GroupingStrategy::KMeans {
            n_clusters,
            restarts,
            seed,
        } => {
            if !(MIN_CLUSTERS..=MAX_CLUSTERS).contains(&n_clusters) {
                return Err(Error::InvalidOption {
                    field: "n_clusters".to_string(),
                    message: format!(
                        "Must be in [{}, {}], got {}",
                        MIN_CLUSTERS, MAX_CLUSTERS, n_clusters
                    ),
                });
            }
            kmeans(coords, n_clusters, restarts, seed)?.labels
        }
    };
    let n_groups = labels.iter().max().map_or(0, |m| m + 1);
    Ok(Grouping { labels, n_groups })
}

/// Integer codes in order of first appearance.
pub fn factorize<T: std::hash::Hash + Eq>(values: &[T]) -> Vec<usize> {
    let mut seen: HashMap<&T, usize> = HashMap::new();
    values
        .iter()
        .map(|v| {
            let next = seen.len();
            *seen.entry(v).or_insert(next)
        })
        .collect()
}

/// Result of one k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    pub labels: Vec<usize>,
    pub centroids: Vec<Point>,
    pub inertia: f64,
    pub iterations: usize,
}

fn sq_dist(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

fn distinct_points(points: &[Point]) -> usize {
    let mut keys: Vec<(u64, u64)> = points
        .iter()
        .map(|p| (coordinate_key(p.x), coordinate_key(p.y)))
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys.len()
}

/// Bit pattern with `-0.0` folded onto `0.0`.
fn coordinate_key(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

/// k-means over 2-D points: k-means++ seeding, Lloyd iterations, best of
/// `restarts` by inertia. Labels are renumbered by first appearance.
pub fn kmeans(points: &[Point], k: usize, restarts: usize, seed: u64) -> Result<KMeans> {
    let distinct = distinct_points(points);
    if k == 0 || k > distinct {
        return Err(Error::ClusterCount {
            requested: k,
            distinct,
        });
    }

    // Convergence threshold scales with the data spread.
    let n = points.len() as f64;
    let (mx, my) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (mx, my) = (mx / n, my / n);
    let var = points
        .iter()
        .map(|p| (p.x - mx).powi(2) + (p.y - my).powi(2))
        .sum::<f64>()
        / (2.0 * n);
    let tol = TOLERANCE * var;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut best: Option<KMeans> = None;
    for _ in 0..restarts.max(1) {
        let centroids = plus_plus_init(points, k, &mut rng);
        let fit = lloyd(points, centroids, tol);
        if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }
    let mut best = best.ok_or_else(|| Error::Config("k-means produced no fit".to_string()))?;
    relabel_by_first_appearance(&mut best);
    Ok(best)
}

fn plus_plus_init(points: &[Point], k: usize, rng: &mut StdRng) -> Vec<Point> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.random_range(0..points.len())]);
    let mut d2: Vec<f64> = points.iter().map(|p| sq_dist(p, &centroids[0])).collect();

    while centroids.len() < k {
        let total: f64 = d2.iter().sum();
        let next = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut acc = 0.0;
            let mut pick = points.len() - 1;
            for (i, w) in d2.iter().enumerate() {
                acc += w;
                if acc >= target && *w > 0.0 {
                    pick = i;
                    break;
                }
            }
            pick
        } else {
            rng.random_range(0..points.len())
        };
        let c = points[next];
        for (p, d) in points.iter().zip(d2.iter_mut()) {
            *d = d.min(sq_dist(p, &c));
        }
        centroids.push(c);
    }
    centroids
}

fn nearest(p: &Point, centroids: &[Point]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(j, c)| (j, sq_dist(p, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

fn lloyd(points: &[Point], mut centroids: Vec<Point>, tol: f64) -> KMeans {
    let k = centroids.len();
    let mut labels = vec![0usize; points.len()];
    let mut iterations = 0;

    for iter in 0..MAX_ITER {
        iterations = iter + 1;
        for (label, p) in labels.iter_mut().zip(points) {
            *label = nearest(p, &centroids).0;
        }

        let mut sums = vec![(0.0, 0.0, 0usize); k];
        for (label, p) in labels.iter().zip(points) {
            let s = &mut sums[*label];
            s.0 += p.x;
            s.1 += p.y;
            s.2 += 1;
        }

        let mut updated = centroids.clone();
        for (j, (sx, sy, count)) in sums.iter().enumerate() {
            if *count > 0 {
                updated[j] = Point::new(sx / *count as f64, sy / *count as f64);
            }
        }
        // Empty clusters take the point farthest from its centroid.
        for j in 0..k {
            if sums[j].2 == 0 {
                let far = points
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (i, sq_dist(p, &updated[labels[i]])))
                    .fold((0, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best })
                    .0;
                updated[j] = points[far];
                labels[far] = j;
            }
        }

        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(a, b)| sq_dist(a, b))
            .sum();
        centroids = updated;
        if shift <= tol {
            break;
        }
    }

    let mut inertia = 0.0;
    for (label, p) in labels.iter_mut().zip(points) {
        let (j, d) = nearest(p, &centroids);
        *label = j;
        inertia += d;
    }
    KMeans {
        labels,
        centroids,
        inertia,
        iterations,
    }
}

fn relabel_by_first_appearance(fit: &mut KMeans) {
    let mapping = factorize(&fit.labels);
    let k = fit.centroids.len();
    let mut centroids = fit.centroids.clone();
    let mut used = vec![false; k];
    for (old, new) in fit.labels.iter().zip(&mapping) {
        if !used[*new] {
            centroids[*new] = fit.centroids[*old];
            used[*new] = true;
        }
    }
    // Clusters that lost all points after the final assignment keep no label.
    centroids.truncate(used.iter().filter(|u| **u).count());
    fit.labels = mapping;
    fit.centroids = centroids;
}
