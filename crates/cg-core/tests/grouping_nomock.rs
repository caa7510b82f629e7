//! Spatial grouping over synthetic coordinates.

use cg_common::Error;
use cg_core::grouping::{assign_groups, kmeans, GroupingStrategy};
use cg_math::Point;

/// 100 points in five loose blobs, generated without an RNG.
fn synthetic_points() -> Vec<Point> {
    let centres = [(0.0, 0.0), (5000.0, 0.0), (0.0, 5000.0), (5000.0, 5000.0), (2500.0, 2500.0)];
    (0..100)
        .map(|i| {
            let (cx, cy) = centres[i % 5];
            let angle = i as f64 * 2.399963;
            let radius = 40.0 * ((i * 7) % 13) as f64;
            Point::new(cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}

#[test]
fn kmeans_is_deterministic_for_a_fixed_seed() {
    let points = synthetic_points();
    let first = kmeans(&points, 5, 10, 42).expect("first fit");
    let second = kmeans(&points, 5, 10, 42).expect("second fit");
    assert_eq!(first.labels, second.labels);
    assert_eq!(first.inertia, second.inertia);
}

#[test]
fn kmeans_groups_are_dense_and_ordered_by_first_appearance() {
    let points = synthetic_points();
    let fit = kmeans(&points, 5, 10, 42).expect("fit");
    let mut seen = Vec::new();
    for label in &fit.labels {
        if !seen.contains(label) {
            seen.push(*label);
        }
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}

#[test]
fn kmeans_recovers_separated_blobs() {
    let points = synthetic_points();
    let fit = kmeans(&points, 5, 10, 42).expect("fit");
    // Points i and i + 5 come from the same blob.
    for i in 0..95 {
        assert_eq!(fit.labels[i], fit.labels[i + 5], "point {}", i);
    }
}

#[test]
fn cluster_count_outside_bounds_is_rejected() {
    let points = synthetic_points();
    let districts = vec!["A"; points.len()];
    for n_clusters in [4, 26] {
        let err = assign_groups(
            &districts,
            &points,
            GroupingStrategy::KMeans {
                n_clusters,
                restarts: 1,
                seed: 42,
            },
        )
        .expect_err("cluster count out of range");
        assert!(matches!(err, Error::InvalidOption { ref field, .. } if field == "n_clusters"));
    }
}

#[test]
fn more_clusters_than_distinct_points_is_rejected() {
    let points = vec![Point::new(1.0, 1.0); 8];
    let err = kmeans(&points, 5, 1, 42).expect_err("only one distinct point");
    assert!(matches!(
        err,
        Error::ClusterCount {
            requested: 5,
            distinct: 1
        }
    ));
}

#[test]
fn administrative_grouping_factorizes_in_first_seen_order() {
    let districts = ["Ullanlinna", "Kruununhaka", "Ullanlinna", "Kallio"];
    let points = vec![Point::new(0.0, 0.0); 4];
    let grouping =
        assign_groups(&districts, &points, GroupingStrategy::Administrative).expect("grouping");
    assert_eq!(grouping.labels, vec![0, 1, 0, 2]);
    assert_eq!(grouping.n_groups, 3);
}
