//! Criterion benchmarks for the model log density in `cg-core`.
//!
//! One gradient evaluation per leapfrog step dominates sampling time; the
//! spatial variants pay for a Cholesky factorisation on every call.

use cg_config::{ModelVariant, PipelineConfig};
use cg_core::covariates::derive_covariates;
use cg_core::model::{build_model, input_columns, prepare_input, ModelSpec, Roles};
use cg_core::parcel::{Parcel, RawField};
use cg_math::Point;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn synthetic_parcels(n: usize) -> Vec<Parcel> {
    (0..n)
        .map(|i| {
            let mut p = Parcel::new(
                format!("p{i}"),
                (i % 20) as f64 * 120.0,
                (i / 20) as f64 * 95.0,
                if i % 2 == 0 { "North" } else { "South" },
            )
            .with(RawField::Population, 10.0 + (i % 17) as f64)
            .with(RawField::Orthodox, 1.0 + (i % 5) as f64)
            .with(RawField::TotalIncome, 400.0 + 13.0 * (i % 31) as f64)
            .with(RawField::EstateIncome, 150.0 + 7.0 * (i % 23) as f64);
            p.group = Some(i % 6);
            p
        })
        .collect()
}

fn model(variant: ModelVariant, n: usize) -> ModelSpec {
    let parcels = synthetic_parcels(n);
    let churches = [Point::new(0.0, 0.0), Point::new(1500.0, 500.0)];
    let table = derive_covariates(&parcels, Some(&churches)).expect("covariates");
    let roles = Roles::default();
    let config = PipelineConfig::default();
    let input = prepare_input(&parcels, &table, &input_columns(variant, &roles), &config)
        .expect("model input");
    build_model(variant, &input, &roles, &config).expect("model")
}

fn bench_log_density(c: &mut Criterion) {
    let mut group = c.benchmark_group("log_density_and_gradient");

    for variant in [ModelVariant::HierarchicalTwoStage, ModelVariant::HierarchicalSpatial] {
        for n in [60usize, 120, 240] {
            let spec = model(variant, n);
            let q = vec![0.05; spec.dim()];
            let mut grad = vec![0.0; spec.dim()];
            group.bench_with_input(BenchmarkId::new(variant.as_str(), n), &q, |b, q| {
                b.iter(|| black_box(spec.log_density_and_gradient(black_box(q), &mut grad)))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_log_density);
criterion_main!(benches);
