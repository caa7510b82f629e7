//! No-mock trace store tests.
//!
//! Writes real Parquet files into a temp directory and reads them back:
//! - Persist produces exactly three artifacts and clears leftovers
//! - Values, shapes, and groups survive a write/read cycle
//! - Schema metadata carries the shape table and version

use std::fs;

use arrow::datatypes::DataType;
use cg_trace::{
    load, persist, read_collection, Draws, GroupKind, SampleCollection, TraceError, TraceKind,
    TraceSet, SHAPES_KEY, VERSION_KEY,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

fn seq(len: usize, scale: f64) -> Vec<f64> {
    (0..len).map(|i| i as f64 * scale).collect()
}

fn trace_set() -> TraceSet {
    let mut prior = SampleCollection::new();
    prior.insert(
        GroupKind::Prior,
        "beta_P",
        Draws::from_values(1, 4, vec![2], seq(8, 0.5)).unwrap(),
    );
    prior.insert(
        GroupKind::PriorPredictive,
        "P",
        Draws::from_values(1, 4, vec![3], seq(12, -1.0)).unwrap(),
    );

    let mut posterior = SampleCollection::new();
    posterior.insert(
        GroupKind::Posterior,
        "beta_O",
        Draws::from_values(2, 3, vec![2, 3], seq(36, 0.25)).unwrap(),
    );
    posterior.insert(
        GroupKind::Posterior,
        "sigma_O",
        Draws::from_values(2, 3, vec![], vec![0.9, 1.1, 1.0, 0.95, 1.05, 1.2]).unwrap(),
    );
    posterior.insert(
        GroupKind::SampleStats,
        "diverging",
        Draws::from_values(2, 3, vec![], vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0]).unwrap(),
    );
    posterior.insert(GroupKind::ObservedData, "O", Draws::constant(vec![-1.2, -0.3, 0.4]));

    let mut posterior_prediction = SampleCollection::new();
    posterior_prediction.insert(
        GroupKind::PosteriorPredictive,
        "O",
        Draws::from_values(2, 3, vec![3], seq(18, 0.1)).unwrap(),
    );
    posterior_prediction.insert(GroupKind::ObservedData, "O", Draws::constant(vec![-1.2, -0.3, 0.4]));

    TraceSet {
        prior,
        posterior,
        posterior_prediction,
    }
}

fn entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ============================================================================
// Persist layout
// ============================================================================

#[test]
fn persist_writes_exactly_three_artifacts() {
    let dir = TempDir::new().unwrap();
    let model_dir = dir.path().join("models").join("hierarchical_spatial");
    let written = persist(&trace_set(), &model_dir).unwrap();
    assert_eq!(written.len(), 3);
    assert_eq!(
        entries(&model_dir),
        vec!["posterior", "posterior_prediction", "prior"]
    );
}

#[test]
fn persist_clears_previous_contents() {
    let dir = TempDir::new().unwrap();
    let model_dir = dir.path().join("m");
    fs::create_dir_all(model_dir.join("stale_subdir")).unwrap();
    fs::write(model_dir.join("old_trace.nc"), b"junk").unwrap();
    fs::write(model_dir.join("stale_subdir").join("x"), b"junk").unwrap();

    persist(&trace_set(), &model_dir).unwrap();
    assert_eq!(
        entries(&model_dir),
        vec!["posterior", "posterior_prediction", "prior"]
    );
}

#[test]
fn persist_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let model_dir = dir.path().join("m");
    persist(&trace_set(), &model_dir).unwrap();
    let first = load(&model_dir).unwrap();
    persist(&trace_set(), &model_dir).unwrap();
    let second = load(&model_dir).unwrap();
    assert_eq!(entries(&model_dir).len(), 3);
    assert_eq!(first, second);
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn load_restores_values_and_shapes() {
    let dir = TempDir::new().unwrap();
    let original = trace_set();
    persist(&original, dir.path()).unwrap();
    let loaded = load(dir.path()).unwrap();
    assert_eq!(loaded, original);

    let beta = loaded.posterior.get(GroupKind::Posterior, "beta_O").unwrap();
    assert_eq!(beta.shape, vec![2, 3]);
    assert_eq!(beta.draw(1, 2), &seq(36, 0.25)[30..36]);
}

#[test]
fn parquet_schema_is_long_format_with_metadata() {
    let dir = TempDir::new().unwrap();
    persist(&trace_set(), dir.path()).unwrap();
    let file = fs::File::open(dir.path().join(TraceKind::Posterior.file_name())).unwrap();
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
    let schema = builder.schema().clone();

    let types: Vec<(String, DataType)> = schema
        .fields()
        .iter()
        .map(|f| (f.name().clone(), f.data_type().clone()))
        .collect();
    assert_eq!(
        types,
        vec![
            ("group".to_string(), DataType::Utf8),
            ("variable".to_string(), DataType::Utf8),
            ("chain".to_string(), DataType::UInt32),
            ("draw".to_string(), DataType::UInt32),
            ("element".to_string(), DataType::UInt32),
            ("value".to_string(), DataType::Float64),
        ]
    );
    assert!(schema.metadata()[SHAPES_KEY].contains("posterior/beta_O"));
    assert_eq!(schema.metadata()[VERSION_KEY], cg_trace::SCHEMA_VERSION);

    let rows: usize = builder.build().unwrap().map(|b| b.unwrap().num_rows()).sum();
    // 36 beta + 6 sigma + 6 diverging + 3 observed
    assert_eq!(rows, 51);
}

#[test]
fn missing_artifact_is_reported() {
    let dir = TempDir::new().unwrap();
    let err = read_collection(&dir.path().join("posterior")).unwrap_err();
    assert!(matches!(err, TraceError::MissingArtifact(_)));
    let common: cg_common::Error = err.into();
    assert_eq!(common.category(), cg_common::ErrorCategory::Persistence);
}
