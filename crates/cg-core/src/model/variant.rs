//! The named model variants.
//!
//! Each [`ModelVariant`] maps to one fixed set of equations. Coefficient
//! prior variances follow the two-stage income/confession models: hyper
//! variance 0.1 per coefficient (0.01 on the stage-one mean in the
//! confession equation) and group variance 0.01.

use std::collections::BTreeMap;

use cg_common::Result;
use cg_config::{ModelVariant, PipelineConfig};
use cg_math::Standardizer;
use serde::Serialize;

use super::input::{DroppedRow, InputColumns, ModelInput};
use super::spec::{Block, Equation, Likelihood, ModelSpec, Pooling, ScalePrior, SpatialTerm, Term};
use crate::covariates::Covariate;

const PRIOR_VAR: f64 = 0.1;
const GROUP_VAR: f64 = 0.01;
const STAGE_ONE_MEAN_VAR: f64 = 0.01;

/// Which covariates play which part in the models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Roles {
    /// Wealth proxy `W`.
    pub wealth: Covariate,
    /// First-stage income outcome `P`.
    pub income: Covariate,
    /// Confessional outcome `O` on the real line.
    pub confession: Covariate,
    /// Confessional share for the Beta likelihood.
    pub share: Covariate,
    pub distance: Covariate,
}

impl Default for Roles {
    fn default() -> Self {
        Roles {
            wealth: Covariate::EstateIncomeLn,
            income: Covariate::IncomePerCapitaLn,
            confession: Covariate::OrthodoxProportionLn,
            share: Covariate::OrthodoxProportion,
            distance: Covariate::DistanceFromChurchKm,
        }
    }
}

fn is_two_stage(variant: ModelVariant) -> bool {
    matches!(
        variant,
        ModelVariant::PooledTwoStage | ModelVariant::HierarchicalTwoStage | ModelVariant::TwoStageSpatial
    )
}

/// Columns a variant reads from the processed table.
pub fn input_columns(variant: ModelVariant, roles: &Roles) -> InputColumns {
    let mut real = vec![roles.wealth];
    let mut unit_interval = Vec::new();
    if is_two_stage(variant) {
        real.push(roles.income);
    }
    match variant {
        ModelVariant::HierarchicalSpatialBeta => unit_interval.push(roles.share),
        ModelVariant::HierarchicalChurchDistance => real.extend([roles.confession, roles.distance]),
        _ => real.push(roles.confession),
    }
    InputColumns {
        real,
        unit_interval,
    }
}

fn hierarchical(hyper_var: Vec<f64>) -> Pooling {
    let group_var = vec![GROUP_VAR; hyper_var.len()];
    Pooling::Hierarchical {
        hyper_var,
        group_var,
    }
}

fn normal(config: &PipelineConfig) -> Likelihood {
    Likelihood::Normal {
        sigma_prior: ScalePrior::Exponential {
            rate: config.priors.noise_rate,
        },
    }
}

/// Income stage: `P ~ N(b0 + b1 W, sigma_P)`.
fn income_equation(roles: &Roles, pooling: Pooling, config: &PipelineConfig) -> Equation {
    Equation {
        name: "P".to_string(),
        outcome: roles.income,
        terms: vec![Term::Intercept, Term::Covariate(roles.wealth)],
        pooling,
        spatial: false,
        likelihood: normal(config),
    }
}

/// Confession stage on the income stage: `O ~ N(b0 + b1 W + b2 mu_P, sigma_O)`.
fn confession_on_income(roles: &Roles, pooling: Pooling, spatial: bool, config: &PipelineConfig) -> Equation {
    Equation {
        name: "O".to_string(),
        outcome: roles.confession,
        terms: vec![Term::Intercept, Term::Covariate(roles.wealth), Term::LatentMean(0)],
        pooling,
        spatial,
        likelihood: normal(config),
    }
}

fn equations(variant: ModelVariant, roles: &Roles, config: &PipelineConfig) -> Vec<Equation> {
    let base = vec![Term::Intercept, Term::Covariate(roles.wealth)];
    match variant {
        ModelVariant::PooledTwoStage => vec![
            income_equation(
                roles,
                Pooling::Pooled {
                    prior_var: vec![PRIOR_VAR; 2],
                },
                config,
            ),
            confession_on_income(
                roles,
                Pooling::Pooled {
                    prior_var: vec![PRIOR_VAR; 3],
                },
                false,
                config,
            ),
        ],
        ModelVariant::HierarchicalTwoStage | ModelVariant::TwoStageSpatial => vec![
            income_equation(roles, hierarchical(vec![PRIOR_VAR; 2]), config),
            confession_on_income(
                roles,
                hierarchical(vec![PRIOR_VAR, PRIOR_VAR, STAGE_ONE_MEAN_VAR]),
                variant == ModelVariant::TwoStageSpatial,
                config,
            ),
        ],
        ModelVariant::HierarchicalSpatial => vec![Equation {
            name: "O".to_string(),
            outcome: roles.confession,
            terms: base,
            pooling: hierarchical(vec![PRIOR_VAR; 2]),
            spatial: true,
            likelihood: normal(config),
        }],
        ModelVariant::HierarchicalSpatialBeta => vec![Equation {
            name: "O".to_string(),
            outcome: roles.share,
            terms: base,
            pooling: hierarchical(vec![PRIOR_VAR; 2]),
            spatial: true,
            likelihood: Likelihood::Beta {
                phi_prior: ScalePrior::Exponential {
                    rate: config.priors.concentration_rate,
                },
            },
        }],
        ModelVariant::HierarchicalChurchDistance => {
            let mut terms = base;
            terms.push(Term::Covariate(roles.distance));
            vec![Equation {
                name: "O".to_string(),
                outcome: roles.confession,
                terms,
                pooling: hierarchical(vec![PRIOR_VAR; 3]),
                spatial: true,
                likelihood: normal(config),
            }]
        }
    }
}

/// Build one variant over a prepared input.
pub fn build_model(
    variant: ModelVariant,
    input: &ModelInput,
    roles: &Roles,
    config: &PipelineConfig,
) -> Result<ModelSpec> {
    let spatial = variant.is_spatial().then(|| {
        SpatialTerm::from_distances(
            &input.distances,
            ScalePrior::Exponential {
                rate: config.priors.eta_sq_rate,
            },
            ScalePrior::Exponential {
                rate: config.priors.rho_sq_rate,
            },
            config.nugget,
        )
    });
    ModelSpec::new(
        variant,
        input.groups.clone(),
        input.n_groups,
        input.columns.clone(),
        equations(variant, roles, config),
        spatial,
    )
}

/// Description of a built model, written next to its traces.
#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub variant: ModelVariant,
    pub rows: usize,
    pub groups: usize,
    pub dimension: usize,
    pub roles: Roles,
    pub equations: Vec<Equation>,
    pub spatial: Option<SpatialTerm>,
    pub parameters: Vec<Block>,
    pub standardization: BTreeMap<Covariate, Standardizer>,
    pub dropped: Vec<DroppedRow>,
}

impl ModelMetadata {
    pub fn new(spec: &ModelSpec, input: &ModelInput, roles: &Roles) -> Self {
        ModelMetadata {
            variant: spec.variant,
            rows: spec.n,
            groups: spec.k,
            dimension: spec.dim(),
            roles: *roles,
            equations: spec.equations.clone(),
            spatial: spec.spatial.clone(),
            parameters: spec.layout.blocks().to_vec(),
            standardization: input.standardization.clone(),
            dropped: input.dropped.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariates::derive_covariates;
    use crate::model::input::prepare_input;
    use crate::parcel::{Parcel, RawField};
    use cg_math::Point;

    fn parcels() -> Vec<Parcel> {
        (0..12)
            .map(|i| {
                let pop = 10.0 + i as f64;
                let mut p = Parcel::new(format!("p{i}"), (i % 4) as f64 * 150.0, (i / 4) as f64 * 90.0, "A")
                    .with(RawField::Population, pop)
                    .with(RawField::Orthodox, 1.0 + (i % 3) as f64)
                    .with(RawField::TotalIncome, 500.0 + 40.0 * i as f64)
                    .with(RawField::EstateIncome, 200.0 + 15.0 * ((i * 7) % 5) as f64);
                p.group = Some(i % 3);
                p
            })
            .collect()
    }

    fn build(variant: ModelVariant) -> ModelSpec {
        let ps = parcels();
        let churches = [Point::new(0.0, 0.0)];
        let table = derive_covariates(&ps, Some(&churches)).unwrap();
        let roles = Roles::default();
        let config = PipelineConfig::default();
        let input = prepare_input(&ps, &table, &input_columns(variant, &roles), &config).unwrap();
        build_model(variant, &input, &roles, &config).unwrap()
    }

    fn block_names(spec: &ModelSpec) -> Vec<String> {
        spec.layout.blocks().iter().map(|b| b.name.clone()).collect()
    }

    #[test]
    fn pooled_two_stage_parameters() {
        let spec = build(ModelVariant::PooledTwoStage);
        assert_eq!(block_names(&spec), vec!["beta_P", "sigma_P", "beta_O", "sigma_O"]);
        assert_eq!(spec.dim(), 2 + 1 + 3 + 1);
    }

    #[test]
    fn hierarchical_two_stage_confession_hyper_prior() {
        let spec = build(ModelVariant::HierarchicalTwoStage);
        assert_eq!(spec.k, 3);
        assert_eq!(
            spec.equations[1].pooling,
            Pooling::Hierarchical {
                hyper_var: vec![0.1, 0.1, 0.01],
                group_var: vec![0.01; 3],
            }
        );
        assert_eq!(spec.layout.block("beta_O").unwrap().shape, vec![3, 3]);
    }

    #[test]
    fn spatial_variants_carry_latent_field() {
        for variant in [
            ModelVariant::HierarchicalSpatial,
            ModelVariant::HierarchicalSpatialBeta,
            ModelVariant::HierarchicalChurchDistance,
            ModelVariant::TwoStageSpatial,
        ] {
            let spec = build(variant);
            assert!(spec.spatial.is_some(), "{}", variant.as_str());
            assert_eq!(spec.layout.block("gamma").unwrap().shape, vec![spec.n]);
        }
        assert!(build(ModelVariant::HierarchicalTwoStage).spatial.is_none());
    }

    #[test]
    fn beta_variant_reads_unstandardised_share() {
        let spec = build(ModelVariant::HierarchicalSpatialBeta);
        assert!(spec.layout.block("phi_O").is_some());
        assert!(spec.observed(0).iter().all(|y| *y > 0.0 && *y < 1.0));
    }

    #[test]
    fn church_distance_adds_third_term() {
        let spec = build(ModelVariant::HierarchicalChurchDistance);
        assert_eq!(
            spec.equations[0].terms[2],
            Term::Covariate(Covariate::DistanceFromChurchKm)
        );
    }
}
