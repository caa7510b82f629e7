//! The batch stages behind the CLI: prepare, features, train, summarize.
//!
//! Each stage reads its inputs from disk, writes its outputs to disk, and
//! logs through the caller's [`LogContext`]. Nothing here installs a
//! subscriber or reads the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cg_common::{Error, Result};
use cg_config::{ConfigSnapshot, ModelVariant, PipelineConfig};
use cg_math::Point;
use serde::Serialize;

use crate::covariates::derive_covariates;
use crate::dataset::{read_parcels, read_points, write_parcels, OldDistricts, ParcelTable};
use crate::diagnostics::{write_diagnostics, DiagnosticsPaths};
use crate::grouping::{assign_groups, GroupingStrategy};
use crate::inference::{InferenceEngine, InferenceRun, NutsEngine, SamplerSettings};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::model::{build_model, input_columns, prepare_input, ModelMetadata, Roles};
use crate::tax::{derive_tax, read_tax_records, write_tax_records};

pub const MODEL_FILE: &str = "model.json";
pub const SNAPSHOT_FILE: &str = "config_snapshot.json";

/// Result of [`prepare`].
#[derive(Debug, Clone, Serialize)]
pub struct PrepareSummary {
    pub rows: usize,
    pub old: usize,
    pub output: PathBuf,
}

/// Clean a raw census table: canonical headers and the `is_old` flag.
pub fn prepare(
    raw: &Path,
    old_districts: Option<&Path>,
    output: &Path,
    ctx: &LogContext,
) -> Result<PrepareSummary> {
    let mut table = read_parcels(raw)?;
    log_event!(
        ctx,
        INFO,
        event_names::PARCELS_LOADED,
        Stage::Prepare,
        "parcels loaded",
        rows = table.parcels.len(),
        path = raw.display().to_string().as_str()
    );

    let old = match old_districts {
        Some(path) => {
            let districts = OldDistricts::load(path)?;
            let inside = districts.mark(&mut table.parcels);
            log_event!(
                ctx,
                INFO,
                event_names::OLD_DISTRICTS_MARKED,
                Stage::Prepare,
                "old districts marked",
                polygons = districts.polygons.len(),
                inside = inside
            );
            inside
        }
        None => table.parcels.iter().filter(|p| p.is_old).count(),
    };

    write_parcels(output, &table.parcels, &table.covariates)?;
    Ok(PrepareSummary {
        rows: table.parcels.len(),
        old,
        output: output.to_path_buf(),
    })
}

/// Inputs of [`build_features`] besides the parcel table.
#[derive(Debug, Clone, Default)]
pub struct FeatureInputs {
    pub churches: Option<PathBuf>,
    /// Tax register in, derived register out.
    pub tax: Option<(PathBuf, PathBuf)>,
}

/// Result of [`build_features`].
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSummary {
    pub rows: usize,
    pub groups: usize,
    pub churches: usize,
    pub tax_records: Option<usize>,
    pub output: PathBuf,
}

/// Assign groups and derive every covariate; optionally derive the tax register.
pub fn build_features(
    input: &Path,
    inputs: &FeatureInputs,
    output: &Path,
    config: &PipelineConfig,
    ctx: &LogContext,
) -> Result<FeatureSummary> {
    let mut table = read_parcels(input)?;
    let parcels = &mut table.parcels;

    let districts: Vec<&str> = parcels.iter().map(|p| p.district.as_str()).collect();
    let coords: Vec<Point> = parcels.iter().map(|p| p.coord).collect();
    let grouping = assign_groups(&districts, &coords, GroupingStrategy::from_config(config))?;
    for (p, g) in parcels.iter_mut().zip(&grouping.labels) {
        p.group = Some(*g);
    }
    log_event!(
        ctx,
        INFO,
        event_names::GROUPS_ASSIGNED,
        Stage::Features,
        "groups assigned",
        method = config.grouping.to_string().as_str(),
        groups = grouping.n_groups
    );

    let churches = inputs.churches.as_deref().map(read_points).transpose()?;
    let covariates = derive_covariates(parcels, churches.as_deref())?;
    log_event!(
        ctx,
        INFO,
        event_names::COVARIATES_DERIVED,
        Stage::Features,
        "covariates derived",
        rows = covariates.rows(),
        churches = churches.as_ref().map_or(0, Vec::len)
    );
    write_parcels(output, parcels, &covariates)?;

    let tax_records = match &inputs.tax {
        Some((tax_in, tax_out)) => {
            let mut records = read_tax_records(tax_in)?;
            let missing = derive_tax(&mut records);
            write_tax_records(tax_out, &records)?;
            log_event!(
                ctx,
                INFO,
                event_names::TAX_DERIVED,
                Stage::Features,
                "tax register derived",
                records = records.len(),
                missing_total = missing
            );
            Some(records.len())
        }
        None => None,
    };

    Ok(FeatureSummary {
        rows: parcels.len(),
        groups: grouping.n_groups,
        churches: churches.map_or(0, |c| c.len()),
        tax_records,
        output: output.to_path_buf(),
    })
}

/// Output locations of a training run.
#[derive(Debug, Clone)]
pub struct TrainDirs {
    /// Traces go to `<models>/<variant>/`.
    pub models: PathBuf,
    /// Model metadata and the config snapshot go to `<reports>/<variant>/`.
    pub reports: PathBuf,
}

/// What happened to one variant.
#[derive(Debug, Clone, Serialize)]
pub struct VariantOutcome {
    pub variant: ModelVariant,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub failure: Option<Arc<Error>>,
}

impl VariantOutcome {
    fn ok(variant: ModelVariant, rows: usize, artifacts: Vec<PathBuf>) -> Self {
        VariantOutcome {
            variant,
            status: "ok",
            rows: Some(rows),
            artifacts,
            error: None,
            failure: None,
        }
    }

    fn failed(variant: ModelVariant, err: Error) -> Self {
        VariantOutcome {
            variant,
            status: "failed",
            rows: None,
            artifacts: Vec::new(),
            error: Some(err.to_string()),
            failure: Some(Arc::new(err)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

/// Fit every configured variant on a processed parcel table.
///
/// A failing variant is logged and reported; the remaining variants still run.
pub fn train(
    processed: &Path,
    dirs: &TrainDirs,
    config: &PipelineConfig,
    snapshot: &ConfigSnapshot,
    ctx: &LogContext,
) -> Result<Vec<VariantOutcome>> {
    let table = read_parcels(processed)?;
    log_event!(
        ctx,
        INFO,
        event_names::PARCELS_LOADED,
        Stage::Model,
        "processed parcels loaded",
        rows = table.parcels.len()
    );

    let roles = Roles::default();
    let engine = NutsEngine;
    let mut outcomes = Vec::with_capacity(config.variants.len());
    for variant in &config.variants {
        let vctx = ctx.with_variant(variant.as_str());
        let outcome = match train_variant(*variant, &table, &roles, &engine, dirs, config, snapshot, &vctx)
        {
            Ok((rows, artifacts)) => VariantOutcome::ok(*variant, rows, artifacts),
            Err(err) => {
                log_event!(
                    vctx,
                    ERROR,
                    event_names::VARIANT_FAILED,
                    Stage::Model,
                    "variant failed",
                    code = err.code(),
                    error = err.to_string().as_str()
                );
                VariantOutcome::failed(*variant, err)
            }
        };
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

#[allow(clippy::too_many_arguments)]
fn train_variant(
    variant: ModelVariant,
    table: &ParcelTable,
    roles: &Roles,
    engine: &dyn InferenceEngine,
    dirs: &TrainDirs,
    config: &PipelineConfig,
    snapshot: &ConfigSnapshot,
    ctx: &LogContext,
) -> Result<(usize, Vec<PathBuf>)> {
    let columns = input_columns(variant, roles);
    let input = prepare_input(&table.parcels, &table.covariates, &columns, config)?;
    if !input.dropped.is_empty() {
        log_event!(
            ctx,
            WARN,
            event_names::ROWS_DROPPED,
            Stage::Model,
            "rows dropped before modelling",
            dropped = input.dropped.len(),
            remaining = input.len()
        );
    }

    let spec = build_model(variant, &input, roles, config)?;
    log_event!(
        ctx,
        INFO,
        event_names::MODEL_BUILT,
        Stage::Model,
        "model built",
        rows = spec.n,
        groups = spec.k,
        dimension = spec.dim()
    );
    let metadata = ModelMetadata::new(&spec, &input, roles);

    let mut run = InferenceRun::new(Arc::new(spec));
    run.sample_prior(config.prior_samples, config.seed, ctx)?;
    run.sample_posterior(engine, &SamplerSettings::from_config(config), ctx)?;
    run.sample_posterior_predictive(config.seed, ctx)?;
    let mut artifacts = run.persist(&dirs.models.join(variant.as_str()), ctx)?;

    let report_dir = dirs.reports.join(variant.as_str());
    fs::create_dir_all(&report_dir)?;
    let model_path = report_dir.join(MODEL_FILE);
    fs::write(&model_path, serde_json::to_string_pretty(&metadata)?)?;
    let snapshot_path = report_dir.join(SNAPSHOT_FILE);
    fs::write(&snapshot_path, serde_json::to_string_pretty(snapshot)?)?;
    artifacts.extend([model_path, snapshot_path]);

    Ok((input.len(), artifacts))
}

/// Write diagnostics for every configured variant that has traces.
///
/// Variants without a trace directory are skipped.
pub fn summarize(
    models: &Path,
    reports: &Path,
    config: &PipelineConfig,
    ctx: &LogContext,
) -> Result<Vec<(ModelVariant, DiagnosticsPaths)>> {
    let mut written = Vec::new();
    for variant in &config.variants {
        let dir = models.join(variant.as_str());
        if !dir.is_dir() {
            continue;
        }
        let vctx = ctx.with_variant(variant.as_str());
        let traces = cg_trace::load(&dir).map_err(|e| e.at(&dir))?;
        let paths = write_diagnostics(&traces, &reports.join(variant.as_str()), config.hdi_prob, &vctx)?;
        written.push((*variant, paths));
    }
    if written.is_empty() {
        return Err(Error::Persistence {
            path: models.to_path_buf(),
            message: "no trace directories for the configured variants".to_string(),
        });
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RAW: &str = "\
id,x,y,district,lutheran_density,orthodox_density,total_density,total_income,estate_income,salary_pension_income,business_income
a,0,0,North,10,2,12,900,300,200,400
b,100,0,North,5,1,6,500,,100,200
c,0,100,South,0,0,0,,,,
";

    #[test]
    fn prepare_marks_old_districts() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("raw.csv");
        fs::write(&raw, RAW).unwrap();
        let polygons = dir.path().join("old.json");
        fs::write(&polygons, r#"{"polygons": [[[-10,-10],[50,-10],[50,50],[-10,50]]]}"#).unwrap();
        let out = dir.path().join("interim/parcels.csv");

        let summary = prepare(&raw, Some(&polygons), &out, &LogContext::new("test")).unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.old, 1);
        let written = read_parcels(&out).unwrap();
        assert!(written.parcels[0].is_old);
        assert!(!written.parcels[1].is_old);
    }

    #[test]
    fn features_assign_administrative_groups() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("raw.csv");
        fs::write(&raw, RAW).unwrap();
        let churches = dir.path().join("churches.csv");
        fs::write(&churches, "x,y\n0,0\n").unwrap();
        let out = dir.path().join("processed.csv");

        let summary = build_features(
            &raw,
            &FeatureInputs {
                churches: Some(churches),
                tax: None,
            },
            &out,
            &PipelineConfig::default(),
            &LogContext::new("test"),
        )
        .unwrap();
        assert_eq!(summary.groups, 2);
        let table = read_parcels(&out).unwrap();
        let groups: Vec<_> = table.parcels.iter().map(|p| p.group).collect();
        assert_eq!(groups, vec![Some(0), Some(0), Some(1)]);
        assert_eq!(
            table
                .covariates
                .value(0, crate::covariates::Covariate::DistanceFromChurch),
            Some(0.0)
        );
    }

    #[test]
    fn summarize_without_traces_fails() {
        let dir = TempDir::new().unwrap();
        let err = summarize(
            &dir.path().join("models"),
            &dir.path().join("reports"),
            &PipelineConfig::default(),
            &LogContext::new("test"),
        )
        .unwrap_err();
        assert_eq!(err.category(), cg_common::ErrorCategory::Persistence);
    }
}
