//! Posterior summaries and posterior predictive checks.
//!
//! Everything here reads persisted traces only: `summary.csv` from the
//! posterior group, `ppc.json` from the observed data and the
//! posterior-predictive draws.

use std::fs;
use std::path::{Path, PathBuf};

use cg_common::{Error, Result};
use cg_math::{mean_sd, summarize, ParameterSummary};
use cg_trace::{GroupKind, SampleCollection, TraceSet};
use serde::{Deserialize, Serialize};

use crate::dataset::csv_error;
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};

/// Header of `summary.csv`.
pub const SUMMARY_HEADER: [&str; 9] = [
    "parameter",
    "mean",
    "sd",
    "hdi_low",
    "hdi_high",
    "mcse_mean",
    "ess_bulk",
    "ess_tail",
    "r_hat",
];

/// Histogram bins shared by observed and simulated values.
pub const HISTOGRAM_BINS: usize = 20;

/// One row of the posterior summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    /// Variable name with element index, e.g. `beta_O[3,1]`.
    pub parameter: String,
    pub summary: ParameterSummary,
}

/// Summarise every scalar element of the posterior group.
pub fn summarize_posterior(posterior: &SampleCollection, hdi_prob: f64) -> Result<Vec<SummaryRow>> {
    let group = posterior
        .group(GroupKind::Posterior)
        .ok_or_else(|| Error::data_quality("posterior", "trace has no posterior group"))?;
    let mut rows = Vec::new();
    for (name, draws) in group {
        for element in 0..draws.element_count() {
            rows.push(SummaryRow {
                parameter: format!("{}{}", name, draws.element_label(element)),
                summary: summarize(&draws.element_chains(element), hdi_prob),
            });
        }
    }
    Ok(rows)
}

fn fmt_number(v: f64) -> String {
    if v.is_finite() {
        format!("{:.6}", v)
    } else {
        String::new()
    }
}

pub fn write_summary_csv(path: &Path, rows: &[SummaryRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer
        .write_record(SUMMARY_HEADER)
        .map_err(|e| csv_error(path, e))?;
    for row in rows {
        let s = &row.summary;
        let mut record = vec![row.parameter.clone()];
        record.extend(
            [
                s.mean, s.sd, s.hdi_low, s.hdi_high, s.mcse_mean, s.ess_bulk, s.ess_tail, s.r_hat,
            ]
            .map(fmt_number),
        );
        writer.write_record(&record).map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

/// Discrepancy statistics compared between observed and simulated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatistic {
    Mean,
    StdDev,
}

impl TestStatistic {
    pub const ALL: [TestStatistic; 2] = [TestStatistic::Mean, TestStatistic::StdDev];

    fn compute(&self, data: &[f64]) -> f64 {
        let (mean, sd) = mean_sd(data);
        match self {
            TestStatistic::Mean => mean,
            TestStatistic::StdDev => sd,
        }
    }
}

/// Observed value of one statistic against its predictive distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticCheck {
    pub statistic: TestStatistic,
    pub observed: f64,
    /// Mean of the statistic over simulated data sets.
    pub simulated_mean: f64,
    /// `P(T(simulated) >= T(observed))`.
    pub p_value: f64,
}

/// Normalised counts on shared bin edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub observed: Vec<f64>,
    pub simulated: Vec<f64>,
}

/// Check of one observed variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableCheck {
    pub variable: String,
    pub n_observations: usize,
    pub n_simulations: usize,
    pub checks: Vec<StatisticCheck>,
    pub histogram: Histogram,
}

/// Contents of `ppc.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpcReport {
    pub variables: Vec<VariableCheck>,
}

fn bin_counts(values: &[f64], lo: f64, width: f64, bins: usize) -> Vec<f64> {
    let mut counts = vec![0.0; bins];
    for v in values.iter().filter(|v| v.is_finite()) {
        let idx = if width > 0.0 {
            (((v - lo) / width) as usize).min(bins - 1)
        } else {
            0
        };
        counts[idx] += 1.0;
    }
    let total: f64 = counts.iter().sum();
    if total > 0.0 {
        counts.iter_mut().for_each(|c| *c /= total);
    }
    counts
}

/// Histograms of observed and pooled simulated values on shared edges.
pub fn shared_histogram(observed: &[f64], simulated: &[f64], bins: usize) -> Histogram {
    let bins = bins.max(1);
    let (lo, hi) = observed
        .iter()
        .chain(simulated)
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if lo > hi {
        return Histogram {
            edges: Vec::new(),
            observed: Vec::new(),
            simulated: Vec::new(),
        };
    }
    let width = (hi - lo) / bins as f64;
    Histogram {
        edges: (0..=bins).map(|i| lo + width * i as f64).collect(),
        observed: bin_counts(observed, lo, width, bins),
        simulated: bin_counts(simulated, lo, width, bins),
    }
}

/// Compare observed data with posterior-predictive draws, variable by variable.
pub fn posterior_predictive_check(collection: &SampleCollection) -> Result<PpcReport> {
    let observed = collection
        .group(GroupKind::ObservedData)
        .ok_or_else(|| Error::data_quality("observed_data", "trace has no observed data"))?;
    let predictive = collection
        .group(GroupKind::PosteriorPredictive)
        .ok_or_else(|| Error::data_quality("posterior_predictive", "trace has no predictive draws"))?;

    let mut variables = Vec::new();
    for (name, obs) in observed {
        let Some(sim) = predictive.get(name) else {
            continue;
        };
        if sim.element_count() != obs.values.len() {
            return Err(Error::dimension(
                format!("predictive draws of {}", name),
                obs.values.len(),
                sim.element_count(),
            ));
        }
        let datasets: Vec<&[f64]> = (0..sim.chains)
            .flat_map(|c| (0..sim.draws).map(move |d| (c, d)))
            .map(|(c, d)| sim.draw(c, d))
            .collect();

        let checks = TestStatistic::ALL
            .iter()
            .map(|stat| {
                let t_obs = stat.compute(&obs.values);
                let t_sim: Vec<f64> = datasets.iter().map(|d| stat.compute(d)).collect();
                let n = t_sim.len().max(1) as f64;
                StatisticCheck {
                    statistic: *stat,
                    observed: t_obs,
                    simulated_mean: t_sim.iter().sum::<f64>() / n,
                    p_value: t_sim.iter().filter(|t| **t >= t_obs).count() as f64 / n,
                }
            })
            .collect();

        variables.push(VariableCheck {
            variable: name.clone(),
            n_observations: obs.values.len(),
            n_simulations: datasets.len(),
            checks,
            histogram: shared_histogram(&obs.values, &sim.values, HISTOGRAM_BINS),
        });
    }
    Ok(PpcReport { variables })
}

/// Paths written by [`write_diagnostics`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsPaths {
    pub summary: PathBuf,
    pub ppc: PathBuf,
}

/// Write `summary.csv` and `ppc.json` for one model into `dir`.
pub fn write_diagnostics(
    traces: &TraceSet,
    dir: &Path,
    hdi_prob: f64,
    ctx: &LogContext,
) -> Result<DiagnosticsPaths> {
    fs::create_dir_all(dir)?;
    let rows = summarize_posterior(&traces.posterior, hdi_prob)?;
    let summary = dir.join("summary.csv");
    write_summary_csv(&summary, &rows)?;

    let report = posterior_predictive_check(&traces.posterior_prediction)?;
    let ppc = dir.join("ppc.json");
    fs::write(&ppc, serde_json::to_string_pretty(&report)?)?;

    let worst_rhat = rows
        .iter()
        .map(|r| r.summary.r_hat)
        .filter(|r| r.is_finite())
        .fold(f64::NAN, f64::max);
    log_event!(
        ctx,
        INFO,
        event_names::DIAGNOSTICS_WRITTEN,
        Stage::Summarize,
        "diagnostics written",
        parameters = rows.len(),
        max_r_hat = worst_rhat,
        dir = dir.display().to_string().as_str()
    );
    Ok(DiagnosticsPaths { summary, ppc })
}
