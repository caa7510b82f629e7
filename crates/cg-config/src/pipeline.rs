//! Typed pipeline configuration.
//!
//! One `PipelineConfig` is loaded per invocation and passed by reference to
//! every component; nothing reads options from the environment after load.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Which districts enter the modelling table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "DistrictFilterRepr", into = "DistrictFilterRepr")]
pub enum DistrictFilter {
    /// Every district.
    #[default]
    All,
    /// Only the listed district labels.
    Only(BTreeSet<String>),
}

impl DistrictFilter {
    /// Whether a parcel in `district` passes the filter.
    pub fn allows(&self, district: &str) -> bool {
        match self {
            DistrictFilter::All => true,
            DistrictFilter::Only(labels) => labels.contains(district),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DistrictFilterRepr {
    Keyword(String),
    List(Vec<String>),
}

impl TryFrom<DistrictFilterRepr> for DistrictFilter {
    type Error = String;

    fn try_from(repr: DistrictFilterRepr) -> Result<Self, Self::Error> {
        match repr {
            DistrictFilterRepr::Keyword(word) if word.eq_ignore_ascii_case("all") => {
                Ok(DistrictFilter::All)
            }
            DistrictFilterRepr::Keyword(word) => Err(format!(
                "districts must be \"all\" or a list of labels, got \"{}\"",
                word
            )),
            DistrictFilterRepr::List(labels) => Ok(DistrictFilter::Only(labels.into_iter().collect())),
        }
    }
}

impl From<DistrictFilter> for DistrictFilterRepr {
    fn from(filter: DistrictFilter) -> Self {
        match filter {
            DistrictFilter::All => DistrictFilterRepr::Keyword("all".to_string()),
            DistrictFilter::Only(labels) => DistrictFilterRepr::List(labels.into_iter().collect()),
        }
    }
}

/// How parcels are assigned to groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMethod {
    /// One group per administrative district, in first-seen order.
    #[default]
    Administrative,
    /// k-means over parcel coordinates.
    Kmeans,
}

impl fmt::Display for GroupingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupingMethod::Administrative => write!(f, "administrative"),
            GroupingMethod::Kmeans => write!(f, "kmeans"),
        }
    }
}

/// Named model variants. Each is a distinct model, never merged into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Income then confession, one coefficient vector shared by all parcels.
    PooledTwoStage,
    /// Income then confession, group coefficients pooled toward hyper-priors.
    HierarchicalTwoStage,
    /// Log orthodox share on wealth plus a Gaussian-process term.
    HierarchicalSpatial,
    /// Orthodox share with a Beta likelihood plus a Gaussian-process term.
    HierarchicalSpatialBeta,
    /// Adds distance to the nearest church to the spatial model.
    HierarchicalChurchDistance,
    /// Two-stage model whose second stage carries the spatial term.
    TwoStageSpatial,
}

impl ModelVariant {
    /// All variants in a stable order.
    pub const ALL: &'static [ModelVariant] = &[
        ModelVariant::PooledTwoStage,
        ModelVariant::HierarchicalTwoStage,
        ModelVariant::HierarchicalSpatial,
        ModelVariant::HierarchicalSpatialBeta,
        ModelVariant::HierarchicalChurchDistance,
        ModelVariant::TwoStageSpatial,
    ];

    /// Directory-safe name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::PooledTwoStage => "pooled_two_stage",
            ModelVariant::HierarchicalTwoStage => "hierarchical_two_stage",
            ModelVariant::HierarchicalSpatial => "hierarchical_spatial",
            ModelVariant::HierarchicalSpatialBeta => "hierarchical_spatial_beta",
            ModelVariant::HierarchicalChurchDistance => "hierarchical_church_distance",
            ModelVariant::TwoStageSpatial => "two_stage_spatial",
        }
    }

    /// Parse a variant name.
    pub fn parse(s: &str) -> Option<ModelVariant> {
        ModelVariant::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s.trim().to_lowercase())
    }

    /// Whether the variant carries a Gaussian-process term.
    pub fn is_spatial(&self) -> bool {
        matches!(
            self,
            ModelVariant::HierarchicalSpatial
                | ModelVariant::HierarchicalSpatialBeta
                | ModelVariant::HierarchicalChurchDistance
                | ModelVariant::TwoStageSpatial
        )
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelVariant::parse(s).ok_or_else(|| format!("unknown model variant: {}", s))
    }
}

/// Prior settings shared by every variant.
///
/// Coefficient variances are part of each variant's definition; these cover
/// the scale and kernel parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorSettings {
    /// Rate of the Exponential prior on observation noise σ.
    pub noise_rate: f64,
    /// Rate of the Exponential prior on the Beta concentration φ.
    pub concentration_rate: f64,
    /// Rate of the Exponential prior on the kernel amplitude η².
    pub eta_sq_rate: f64,
    /// Rate of the Exponential prior on the inverse squared length scale ρ².
    pub rho_sq_rate: f64,
}

impl Default for PriorSettings {
    fn default() -> Self {
        Self {
            noise_rate: 1.0,
            concentration_rate: 0.1,
            eta_sq_rate: 1.0,
            rho_sq_rate: 1.0,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Schema version of this configuration.
    pub schema_version: String,

    /// Drop parcels whose population is below this value.
    pub min_density: f64,

    /// District allow-list.
    pub districts: DistrictFilter,

    /// Grouping strategy.
    pub grouping: GroupingMethod,

    /// Cluster count for k-means grouping.
    pub n_clusters: usize,

    /// k-means restarts; the lowest-inertia solution wins.
    pub kmeans_restarts: usize,

    /// Seed shared by clustering and all sampling stages.
    pub seed: u64,

    /// Prior-predictive draws.
    pub prior_samples: usize,

    /// Posterior draws per chain.
    pub draws: usize,

    /// Warm-up iterations per chain (discarded).
    pub tune: usize,

    /// Target acceptance statistic for step-size adaptation.
    pub target_accept: f64,

    /// Independent chains.
    pub chains: usize,

    /// Maximum NUTS tree depth.
    pub max_treedepth: usize,

    /// Fail the run when divergent / total draws exceeds this fraction.
    pub max_divergence_fraction: f64,

    /// Diagonal nugget added to the spatial covariance.
    pub nugget: f64,

    /// Coordinates are divided by this before computing kernel distances
    /// (1000 turns metres into kilometres).
    pub distance_scale: f64,

    /// Keep every k-th row of the modelling table (1 keeps all rows).
    pub subsample_stride: usize,

    /// Z-score continuous covariates and Normal outcomes before modelling.
    pub standardize: bool,

    /// Credible interval probability for summaries.
    pub hdi_prob: f64,

    /// Variants to fit, in order.
    pub variants: Vec<ModelVariant>,

    /// Priors for noise and kernel parameters.
    pub priors: PriorSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            min_density: 5.0,
            districts: DistrictFilter::All,
            grouping: GroupingMethod::Administrative,
            n_clusters: 10,
            kmeans_restarts: 10,
            seed: 42,
            prior_samples: 1000,
            draws: 1000,
            tune: 1000,
            target_accept: 0.9,
            chains: 4,
            max_treedepth: 10,
            max_divergence_fraction: 0.05,
            nugget: 0.01,
            distance_scale: 1000.0,
            subsample_stride: 1,
            standardize: true,
            hdi_prob: 0.94,
            variants: vec![
                ModelVariant::PooledTwoStage,
                ModelVariant::HierarchicalTwoStage,
            ],
            priors: PriorSettings::default(),
        }
    }
}
