//! Immutable model graphs.
//!
//! A [`ModelSpec`] is a list of regression equations over one set of rows,
//! optionally sharing a Gaussian-process latent field. Free parameters live
//! in one unconstrained vector described by a [`ParameterLayout`]; positive
//! parameters are stored on the log scale.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::sync::Arc;

use cg_common::{Error, Result};
use cg_config::ModelVariant;
use cg_math::{squared, validate_distance_matrix};
use nalgebra::DMatrix;
use serde::Serialize;

use crate::covariates::Covariate;

/// Prior of a positive scale parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ScalePrior {
    Exponential { rate: f64 },
    HalfNormal { sd: f64 },
}

impl ScalePrior {
    fn validate(&self, field: &str) -> Result<()> {
        let (name, value) = match self {
            ScalePrior::Exponential { rate } => ("rate", *rate),
            ScalePrior::HalfNormal { sd } => ("sd", *sd),
        };
        if value > 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(Error::InvalidOption {
                field: field.to_string(),
                message: format!("prior {} must be positive, got {}", name, value),
            })
        }
    }
}

/// How regression coefficients share information across groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pooling {
    /// One coefficient vector `beta ~ N(0, diag(prior_var))`.
    Pooled { prior_var: Vec<f64> },
    /// `theta ~ N(0, diag(hyper_var))`, `beta[g] ~ N(theta, diag(group_var))`.
    Hierarchical {
        hyper_var: Vec<f64>,
        group_var: Vec<f64>,
    },
}

impl Pooling {
    fn variances(&self) -> Vec<&[f64]> {
        match self {
            Pooling::Pooled { prior_var } => vec![prior_var],
            Pooling::Hierarchical {
                hyper_var,
                group_var,
            } => vec![hyper_var, group_var],
        }
    }
}

/// One column of an equation's design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "term", content = "source", rename_all = "snake_case")]
pub enum Term {
    Intercept,
    Covariate(Covariate),
    /// Linear predictor of an earlier equation, by index.
    LatentMean(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Likelihood {
    Normal { sigma_prior: ScalePrior },
    /// Mean `logistic(mu)`, concentration `phi`.
    Beta { phi_prior: ScalePrior },
}

impl Likelihood {
    fn scale_name(&self) -> &'static str {
        match self {
            Likelihood::Normal { .. } => "sigma",
            Likelihood::Beta { .. } => "phi",
        }
    }

    pub fn scale_prior(&self) -> ScalePrior {
        match self {
            Likelihood::Normal { sigma_prior } => *sigma_prior,
            Likelihood::Beta { phi_prior } => *phi_prior,
        }
    }
}

/// One observed outcome and its regression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Equation {
    /// Short label used in parameter names, e.g. `O` gives `beta_O`.
    pub name: String,
    pub outcome: Covariate,
    pub terms: Vec<Term>,
    pub pooling: Pooling,
    /// Adds the shared latent field to the linear predictor.
    pub spatial: bool,
    pub likelihood: Likelihood,
}

/// Gaussian-process latent field over the rows.
#[derive(Debug, Clone, Serialize)]
pub struct SpatialTerm {
    pub eta_sq_prior: ScalePrior,
    pub rho_sq_prior: ScalePrior,
    pub nugget: f64,
    /// Squared pairwise distances in model units.
    #[serde(skip)]
    pub dist_sq: Arc<DMatrix<f64>>,
}

impl SpatialTerm {
    /// Build from a plain distance matrix.
    pub fn from_distances(
        distances: &DMatrix<f64>,
        eta_sq_prior: ScalePrior,
        rho_sq_prior: ScalePrior,
        nugget: f64,
    ) -> Self {
        SpatialTerm {
            eta_sq_prior,
            rho_sq_prior,
            nugget,
            dist_sq: Arc::new(squared(distances)),
        }
    }
}

/// A named slice of the parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub name: String,
    /// Shape of the constrained value; empty for scalars.
    pub shape: Vec<usize>,
    pub offset: usize,
    /// Stored as `ln(value)`.
    pub positive: bool,
}

impl Block {
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len()
    }
}

/// Ordered blocks over the unconstrained vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterLayout {
    blocks: Vec<Block>,
    dim: usize,
}

impl ParameterLayout {
    fn push(&mut self, name: String, shape: Vec<usize>, positive: bool) -> usize {
        let offset = self.dim;
        let block = Block {
            name,
            shape,
            offset,
            positive,
        };
        self.dim += block.len();
        self.blocks.push(block);
        offset
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Map an unconstrained vector to parameter values.
    pub fn constrain(&self, q: &[f64]) -> Vec<f64> {
        let mut out = q.to_vec();
        for b in self.blocks.iter().filter(|b| b.positive) {
            for v in &mut out[b.range()] {
                *v = v.exp();
            }
        }
        out
    }

    /// Inverse of [`constrain`](Self::constrain).
    pub fn unconstrain(&self, values: &[f64]) -> Vec<f64> {
        let mut out = values.to_vec();
        for b in self.blocks.iter().filter(|b| b.positive) {
            for v in &mut out[b.range()] {
                *v = v.ln();
            }
        }
        out
    }
}

/// Offsets of one equation's parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct EquationSlots {
    pub theta: Option<usize>,
    pub beta: usize,
    pub scale: usize,
}

/// Offsets of the latent-field parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SpatialSlots {
    pub eta_sq: usize,
    pub rho_sq: usize,
    pub gamma: usize,
}

/// A validated, immutable model.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub variant: ModelVariant,
    /// Rows.
    pub n: usize,
    /// Groups.
    pub k: usize,
    pub groups: Arc<Vec<usize>>,
    pub columns: Arc<BTreeMap<Covariate, Vec<f64>>>,
    pub equations: Vec<Equation>,
    pub spatial: Option<SpatialTerm>,
    pub layout: ParameterLayout,
    pub(crate) slots: Vec<EquationSlots>,
    pub(crate) spatial_slots: Option<SpatialSlots>,
}

fn config_error(field: impl Into<String>, message: impl Into<String>) -> Error {
    Error::InvalidOption {
        field: field.into(),
        message: message.into(),
    }
}

impl ModelSpec {
    /// Validate the pieces and lay out the parameter vector.
    pub fn new(
        variant: ModelVariant,
        groups: Vec<usize>,
        k: usize,
        columns: BTreeMap<Covariate, Vec<f64>>,
        equations: Vec<Equation>,
        spatial: Option<SpatialTerm>,
    ) -> Result<ModelSpec> {
        let n = groups.len();
        if n == 0 {
            return Err(config_error("rows", "model needs at least one row"));
        }
        if k == 0 {
            return Err(config_error("groups", "model needs at least one group"));
        }
        if let Some((row, g)) = groups.iter().enumerate().find(|(_, g)| **g >= k) {
            return Err(config_error(
                "groups",
                format!("row {} has group {} but K = {}", row, g, k),
            ));
        }
        for (cov, values) in &columns {
            if values.len() != n {
                return Err(Error::dimension(cov.name(), n, values.len()));
            }
            if let Some(row) = values.iter().position(|v| !v.is_finite()) {
                return Err(Error::DataQuality {
                    row: Some(row),
                    column: cov.name().to_string(),
                    message: "non-finite model input".to_string(),
                });
            }
        }
        if equations.is_empty() {
            return Err(config_error("equations", "model needs at least one equation"));
        }

        let mut names = BTreeSet::new();
        for (e, eq) in equations.iter().enumerate() {
            if !names.insert(eq.name.as_str()) {
                return Err(config_error(
                    "equations",
                    format!("duplicate equation name {}", eq.name),
                ));
            }
            validate_equation(e, eq, &columns)?;
            if eq.spatial && spatial.is_none() {
                return Err(config_error(
                    "spatial",
                    format!("equation {} is spatial but the model has no latent field", eq.name),
                ));
            }
        }

        if let Some(sp) = &spatial {
            validate_distance_matrix(&sp.dist_sq, n)?;
            if !(sp.nugget > 0.0 && sp.nugget.is_finite()) {
                return Err(config_error("nugget", format!("must be positive, got {}", sp.nugget)));
            }
            sp.eta_sq_prior.validate("eta_sq")?;
            sp.rho_sq_prior.validate("rho_sq")?;
        }

        let mut layout = ParameterLayout::default();
        let mut slots = Vec::with_capacity(equations.len());
        for eq in &equations {
            let p = eq.terms.len();
            let (theta, beta) = match eq.pooling {
                Pooling::Pooled { .. } => (None, layout.push(format!("beta_{}", eq.name), vec![p], false)),
                Pooling::Hierarchical { .. } => {
                    let theta = layout.push(format!("theta_{}", eq.name), vec![p], false);
                    let beta = layout.push(format!("beta_{}", eq.name), vec![k, p], false);
                    (Some(theta), beta)
                }
            };
            let scale = layout.push(
                format!("{}_{}", eq.likelihood.scale_name(), eq.name),
                vec![],
                true,
            );
            slots.push(EquationSlots { theta, beta, scale });
        }
        let spatial_slots = spatial.as_ref().map(|_| SpatialSlots {
            eta_sq: layout.push("eta_sq".to_string(), vec![], true),
            rho_sq: layout.push("rho_sq".to_string(), vec![], true),
            gamma: layout.push("gamma".to_string(), vec![n], false),
        });

        Ok(ModelSpec {
            variant,
            n,
            k,
            groups: Arc::new(groups),
            columns: Arc::new(columns),
            equations,
            spatial,
            layout,
            slots,
            spatial_slots,
        })
    }

    pub fn dim(&self) -> usize {
        self.layout.dim()
    }

    /// Observed outcome of equation `e`.
    pub fn observed(&self, e: usize) -> &[f64] {
        &self.columns[&self.equations[e].outcome]
    }

    /// Name of the deterministic linear-predictor node of equation `e`.
    pub fn mu_name(&self, e: usize) -> String {
        format!("mu_{}", self.equations[e].name)
    }

    /// Design value of `term` at row `i`, given earlier linear predictors.
    pub(crate) fn term_value(&self, term: &Term, i: usize, mu: &[Vec<f64>]) -> f64 {
        match term {
            Term::Intercept => 1.0,
            Term::Covariate(c) => self.columns[c][i],
            Term::LatentMean(r) => mu[*r][i],
        }
    }

    /// Offset of coefficient `j` for row `i` of equation `e`.
    pub(crate) fn beta_index(&self, e: usize, i: usize, j: usize) -> usize {
        let slots = &self.slots[e];
        let p = self.equations[e].terms.len();
        match self.equations[e].pooling {
            Pooling::Pooled { .. } => slots.beta + j,
            Pooling::Hierarchical { .. } => slots.beta + self.groups[i] * p + j,
        }
    }

    /// Linear predictors of every equation.
    ///
    /// Reads only coefficient and latent-field blocks, which are stored
    /// untransformed, so `q` may be either the unconstrained vector or the
    /// constrained values.
    pub fn linear_predictors(&self, q: &[f64]) -> Vec<Vec<f64>> {
        let mut mu: Vec<Vec<f64>> = Vec::with_capacity(self.equations.len());
        for (e, eq) in self.equations.iter().enumerate() {
            let gamma = match (eq.spatial, self.spatial_slots) {
                (true, Some(s)) => Some(&q[s.gamma..s.gamma + self.n]),
                _ => None,
            };
            let values: Vec<f64> = (0..self.n)
                .map(|i| {
                    let linear: f64 = eq
                        .terms
                        .iter()
                        .enumerate()
                        .map(|(j, term)| q[self.beta_index(e, i, j)] * self.term_value(term, i, &mu))
                        .sum();
                    linear + gamma.map_or(0.0, |g| g[i])
                })
                .collect();
            mu.push(values);
        }
        mu
    }
}

fn validate_equation(
    e: usize,
    eq: &Equation,
    columns: &BTreeMap<Covariate, Vec<f64>>,
) -> Result<()> {
    let p = eq.terms.len();
    if p == 0 {
        return Err(config_error(
            format!("equation {}", eq.name),
            "equation needs at least one term",
        ));
    }
    for term in &eq.terms {
        match term {
            Term::Intercept => {}
            Term::Covariate(c) if columns.contains_key(c) => {}
            Term::Covariate(c) => {
                return Err(config_error(
                    format!("equation {}", eq.name),
                    format!("covariate {} is not in the model input", c),
                ))
            }
            Term::LatentMean(r) if *r < e => {}
            Term::LatentMean(r) => {
                return Err(config_error(
                    format!("equation {}", eq.name),
                    format!("latent mean of equation {} must refer to an earlier equation", r),
                ))
            }
        }
    }
    for vars in eq.pooling.variances() {
        if vars.len() != p {
            return Err(Error::dimension(format!("prior variances of {}", eq.name), p, vars.len()));
        }
        if let Some(v) = vars.iter().find(|v| !(**v > 0.0 && v.is_finite())) {
            return Err(config_error(
                format!("equation {}", eq.name),
                format!("prior variance must be positive, got {}", v),
            ));
        }
    }
    eq.likelihood.scale_prior().validate(&format!("scale of {}", eq.name))?;

    let observed = columns.get(&eq.outcome).ok_or_else(|| {
        config_error(
            format!("equation {}", eq.name),
            format!("outcome {} is not in the model input", eq.outcome),
        )
    })?;
    if let Likelihood::Beta { .. } = eq.likelihood {
        if let Some(row) = observed.iter().position(|y| !(*y > 0.0 && *y < 1.0)) {
            return Err(Error::DataQuality {
                row: Some(row),
                column: eq.outcome.name().to_string(),
                message: format!("Beta outcome {} is outside (0, 1)", observed[row]),
            });
        }
    }
    Ok(())
}
