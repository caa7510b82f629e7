//! Model-input preparation.
//!
//! Turns the processed parcel table into the dense arrays a model is built
//! from: filtered and renumbered rows, compacted group ids, the selected
//! covariate columns and the pairwise distance matrix in model units.

use std::collections::{BTreeMap, BTreeSet};

use cg_common::{Error, ParcelId, Result};
use cg_config::PipelineConfig;
use cg_math::{pairwise_distances, subsample, Point, Standardizer};
use nalgebra::DMatrix;
use serde::Serialize;

use crate::covariates::{Covariate, CovariateTable};
use crate::parcel::{Parcel, RawField};

/// Why a row left the modelling table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", content = "column", rename_all = "snake_case")]
pub enum DropReason {
    BelowMinDensity,
    District,
    MissingCovariate(Covariate),
    OutsideUnitInterval(Covariate),
}

/// One excluded row, by its position in the processed table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRow {
    pub row: usize,
    pub parcel: ParcelId,
    #[serde(flatten)]
    pub reason: DropReason,
}

/// Which columns a model reads and how.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputColumns {
    /// Columns modelled on the real line; standardised when enabled.
    pub real: Vec<Covariate>,
    /// Bounded outcomes that must lie strictly inside (0, 1).
    pub unit_interval: Vec<Covariate>,
}

impl InputColumns {
    fn all(&self) -> impl Iterator<Item = Covariate> + '_ {
        self.real.iter().chain(&self.unit_interval).copied()
    }
}

/// Dense modelling table.
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub parcel_ids: Vec<ParcelId>,
    pub coords: Vec<Point>,
    pub groups: Vec<usize>,
    pub n_groups: usize,
    pub columns: BTreeMap<Covariate, Vec<f64>>,
    pub standardization: BTreeMap<Covariate, Standardizer>,
    /// Pairwise distances between `coords`, divided by `distance_scale`.
    pub distances: DMatrix<f64>,
    pub dropped: Vec<DroppedRow>,
}

impl ModelInput {
    pub fn len(&self) -> usize {
        self.parcel_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parcel_ids.is_empty()
    }

    /// Column values, or `InvalidOption` naming a column that was not selected.
    pub fn column(&self, cov: Covariate) -> Result<&[f64]> {
        self.columns
            .get(&cov)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::InvalidOption {
                field: cov.name().to_string(),
                message: "column was not selected for this model".to_string(),
            })
    }
}

fn drop_reason(
    parcel: &Parcel,
    row: usize,
    covariates: &CovariateTable,
    columns: &InputColumns,
    config: &PipelineConfig,
) -> Option<DropReason> {
    match parcel.raw(RawField::Population) {
        Some(pop) if pop >= config.min_density => {}
        _ => return Some(DropReason::BelowMinDensity),
    }
    if !config.districts.allows(&parcel.district) {
        return Some(DropReason::District);
    }
    for cov in columns.all() {
        if covariates.value(row, cov).is_none() {
            return Some(DropReason::MissingCovariate(cov));
        }
    }
    for &cov in &columns.unit_interval {
        match covariates.value(row, cov) {
            Some(v) if v > 0.0 && v < 1.0 => {}
            _ => return Some(DropReason::OutsideUnitInterval(cov)),
        }
    }
    None
}

/// Filter, subsample and densify the processed table for one model.
///
/// Rows are kept when population is at least `min_density`, the district is
/// allowed, and every selected column is present (bounded outcomes strictly
/// inside the unit interval). The kept rows are then subsampled by
/// `subsample_stride`, renumbered, and their groups compacted to `0..K`
/// preserving relative order.
pub fn prepare_input(
    parcels: &[Parcel],
    covariates: &CovariateTable,
    columns: &InputColumns,
    config: &PipelineConfig,
) -> Result<ModelInput> {
    if covariates.rows() != parcels.len() {
        return Err(Error::dimension(
            "covariate rows",
            parcels.len(),
            covariates.rows(),
        ));
    }

    let mut dropped = Vec::new();
    let mut kept = Vec::new();
    for (row, parcel) in parcels.iter().enumerate() {
        match drop_reason(parcel, row, covariates, columns, config) {
            Some(reason) => dropped.push(DroppedRow {
                row,
                parcel: parcel.id.clone(),
                reason,
            }),
            None => kept.push(row),
        }
    }
    let kept = subsample(&kept, config.subsample_stride);
    if kept.is_empty() {
        return Err(Error::data_quality(
            "population",
            format!("no rows remain after filtering {} parcels", parcels.len()),
        ));
    }

    let mut raw_groups = Vec::with_capacity(kept.len());
    for &row in &kept {
        let group = parcels[row].group.ok_or_else(|| Error::DataQuality {
            row: Some(row),
            column: "group".to_string(),
            message: "parcel has no group assignment".to_string(),
        })?;
        raw_groups.push(group);
    }
    let (groups, n_groups) = compact_groups(&raw_groups);

    let mut selected = BTreeMap::new();
    let mut standardization = BTreeMap::new();
    for cov in columns.all() {
        let mut values: Vec<f64> = kept
            .iter()
            .filter_map(|&row| covariates.value(row, cov))
            .collect();
        if config.standardize && columns.real.contains(&cov) {
            if let Some(s) = Standardizer::fit(&values) {
                values.iter_mut().for_each(|v| *v = s.apply(*v));
                standardization.insert(cov, s);
            }
        }
        selected.insert(cov, values);
    }

    let coords: Vec<Point> = kept.iter().map(|&row| parcels[row].coord).collect();
    let scaled: Vec<Point> = coords
        .iter()
        .map(|p| p.scaled(config.distance_scale))
        .collect();

    Ok(ModelInput {
        parcel_ids: kept.iter().map(|&row| parcels[row].id.clone()).collect(),
        distances: pairwise_distances(&scaled),
        coords,
        groups,
        n_groups,
        columns: selected,
        standardization,
        dropped,
    })
}

/// Renumber group ids to `0..K`, keeping their relative order.
pub fn compact_groups(groups: &[usize]) -> (Vec<usize>, usize) {
    let present: BTreeSet<usize> = groups.iter().copied().collect();
    let index: BTreeMap<usize, usize> = present
        .iter()
        .enumerate()
        .map(|(new, old)| (*old, new))
        .collect();
    let compacted = groups.iter().map(|g| index[g]).collect();
    (compacted, present.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariates::derive_covariates;
    use cg_math::{squared, SquaredExponential};

    fn parcels() -> Vec<Parcel> {
        let pops = [0.0, 5.0, 10.0, 20.0, 8.0, 12.0, 30.0, 4.0, 9.0, 15.0];
        pops.iter()
            .enumerate()
            .map(|(i, &pop)| {
                let district = if i < 5 { "A" } else { "B" };
                let mut p = Parcel::new(format!("p{i}"), i as f64 * 100.0, 0.0, district)
                    .with(RawField::Population, pop)
                    .with(RawField::Orthodox, (pop / 4.0).floor().max(1.0).min(pop.max(1.0)))
                    .with(RawField::EstateIncome, 100.0 + i as f64);
                p.group = Some(if i < 5 { 3 } else { 7 });
                p
            })
            .collect()
    }

    fn columns() -> InputColumns {
        InputColumns {
            real: vec![Covariate::EstateIncomeLn],
            unit_interval: vec![],
        }
    }

    #[test]
    fn min_density_filter_and_compaction() {
        let ps = parcels();
        let table = derive_covariates(&ps, None).unwrap();
        let input = prepare_input(&ps, &table, &columns(), &PipelineConfig::default()).unwrap();
        assert_eq!(input.len(), 8);
        assert_eq!(input.n_groups, 2);
        assert!(input.groups.iter().all(|g| *g < 2));
        assert_eq!(input.distances.nrows(), 8);
        let below: Vec<_> = input
            .dropped
            .iter()
            .filter(|d| d.reason == DropReason::BelowMinDensity)
            .map(|d| d.row)
            .collect();
        assert_eq!(below, vec![0, 7]);
    }

    #[test]
    fn standardised_columns_have_unit_scale() {
        let ps = parcels();
        let table = derive_covariates(&ps, None).unwrap();
        let input = prepare_input(&ps, &table, &columns(), &PipelineConfig::default()).unwrap();
        let col = input.column(Covariate::EstateIncomeLn).unwrap();
        let mean = col.iter().sum::<f64>() / col.len() as f64;
        assert!(mean.abs() < 1e-12);
        assert!(input.standardization.contains_key(&Covariate::EstateIncomeLn));
    }

    #[test]
    fn missing_group_is_a_data_error() {
        let mut ps = parcels();
        ps[3].group = None;
        let table = derive_covariates(&ps, None).unwrap();
        let err = prepare_input(&ps, &table, &columns(), &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, Error::DataQuality { row: Some(3), .. }));
    }

    #[test]
    fn subsample_recomputes_distances() {
        let ps = parcels();
        let table = derive_covariates(&ps, None).unwrap();
        let config = PipelineConfig {
            subsample_stride: 2,
            ..PipelineConfig::default()
        };
        let input = prepare_input(&ps, &table, &columns(), &config).unwrap();
        assert_eq!(input.len(), 4);
        let direct = pairwise_distances(
            &input
                .coords
                .iter()
                .map(|p| p.scaled(config.distance_scale))
                .collect::<Vec<_>>(),
        );
        assert_eq!(input.distances, direct);
    }

    #[test]
    fn distances_are_in_kilometres() {
        let ps: Vec<Parcel> = parcels()
            .into_iter()
            .enumerate()
            .map(|(i, mut p)| {
                p.coord = Point::new(385_000.0 + i as f64 * 1000.0, 6_672_000.0);
                p
            })
            .collect();
        let table = derive_covariates(&ps, None).unwrap();
        let input = prepare_input(&ps, &table, &columns(), &PipelineConfig::default()).unwrap();
        // Kept rows 1 and 2 are 1000 m apart.
        assert!((input.distances[(0, 1)] - 1.0).abs() < 1e-9);
        assert!((input.distances[(0, 7)] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn spatial_covariance_decays_with_distance() {
        let ps = parcels();
        let table = derive_covariates(&ps, None).unwrap();
        let input = prepare_input(&ps, &table, &columns(), &PipelineConfig::default()).unwrap();
        let k = SquaredExponential::new(1.0, 1.0, 1e-6).covariance(&squared(&input.distances));
        // Neighbouring kept parcels are 100 m apart.
        assert!(k[(0, 1)] > 0.9);
        assert!(k[(0, 1)] > k[(0, 7)]);
        assert!(k[(0, 7)] > 0.0);
    }

    #[test]
    fn unselected_column_names_the_column() {
        let ps = parcels();
        let table = derive_covariates(&ps, None).unwrap();
        let input = prepare_input(&ps, &table, &columns(), &PipelineConfig::default()).unwrap();
        let err = input.column(Covariate::PopulationLn).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { ref field, .. } if field == "population_ln"));
    }

    #[test]
    fn unit_interval_outcomes_exclude_bounds() {
        let mut ps = parcels();
        // Every resident orthodox gives a share of exactly one.
        ps[2].counts.orthodox = Some(10.0);
        let table = derive_covariates(&ps, None).unwrap();
        let cols = InputColumns {
            real: vec![],
            unit_interval: vec![Covariate::OrthodoxProportion],
        };
        let input = prepare_input(&ps, &table, &cols, &PipelineConfig::default()).unwrap();
        assert!(input.dropped.iter().any(|d| d.row == 2
            && d.reason == DropReason::OutsideUnitInterval(Covariate::OrthodoxProportion)));
        assert!(input.standardization.is_empty());
    }

    #[test]
    fn groups_compact_in_order() {
        assert_eq!(compact_groups(&[4, 2, 9, 2]), (vec![1, 0, 2, 0], 3));
    }
}
