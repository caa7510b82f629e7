//! In-memory sample collections.
//!
//! A collection maps named groups (`posterior`, `sample_stats`, ...) to
//! variables, and each variable holds `chains × draws × shape` values in
//! chain-major, then draw, then element order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TraceError;

/// Named groups inside a sample collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Prior,
    PriorPredictive,
    Posterior,
    SampleStats,
    PosteriorPredictive,
    ObservedData,
}

impl GroupKind {
    pub const ALL: &'static [GroupKind] = &[
        GroupKind::Prior,
        GroupKind::PriorPredictive,
        GroupKind::Posterior,
        GroupKind::SampleStats,
        GroupKind::PosteriorPredictive,
        GroupKind::ObservedData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::Prior => "prior",
            GroupKind::PriorPredictive => "prior_predictive",
            GroupKind::Posterior => "posterior",
            GroupKind::SampleStats => "sample_stats",
            GroupKind::PosteriorPredictive => "posterior_predictive",
            GroupKind::ObservedData => "observed_data",
        }
    }

    pub fn parse(s: &str) -> Option<GroupKind> {
        GroupKind::ALL.iter().copied().find(|g| g.as_str() == s)
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Draws of one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draws {
    pub chains: usize,
    pub draws: usize,
    /// Shape of a single draw; empty for scalars.
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl Draws {
    /// Zero-filled draws of the given layout.
    pub fn zeros(chains: usize, draws: usize, shape: Vec<usize>) -> Self {
        let len = chains * draws * shape.iter().product::<usize>();
        Draws {
            chains,
            draws,
            shape,
            values: vec![0.0; len],
        }
    }

    /// Wrap existing values, checking the length against the layout.
    pub fn from_values(
        chains: usize,
        draws: usize,
        shape: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, TraceError> {
        let expected = chains * draws * shape.iter().product::<usize>();
        if values.len() != expected {
            return Err(TraceError::Shape {
                variable: String::new(),
                message: format!("expected {} values, got {}", expected, values.len()),
            });
        }
        Ok(Draws {
            chains,
            draws,
            shape,
            values,
        })
    }

    /// A single fixed draw, as used for observed data.
    pub fn constant(values: Vec<f64>) -> Self {
        Draws {
            chains: 1,
            draws: 1,
            shape: vec![values.len()],
            values,
        }
    }

    /// Scalar elements per draw.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    fn offset(&self, chain: usize, draw: usize) -> usize {
        (chain * self.draws + draw) * self.element_count()
    }

    /// The elements of one draw.
    pub fn draw(&self, chain: usize, draw: usize) -> &[f64] {
        let k = self.element_count();
        let start = self.offset(chain, draw);
        &self.values[start..start + k]
    }

    pub fn draw_mut(&mut self, chain: usize, draw: usize) -> &mut [f64] {
        let k = self.element_count();
        let start = self.offset(chain, draw);
        &mut self.values[start..start + k]
    }

    /// Per-chain sequences of one element.
    pub fn element_chains(&self, element: usize) -> Vec<Vec<f64>> {
        (0..self.chains)
            .map(|c| (0..self.draws).map(|d| self.draw(c, d)[element]).collect())
            .collect()
    }

    /// Every draw of one element, chains concatenated.
    pub fn element_pooled(&self, element: usize) -> Vec<f64> {
        self.element_chains(element).into_iter().flatten().collect()
    }

    /// Index label of a flat element, e.g. `[3, 1]` for shape `[K, 2]`.
    pub fn element_label(&self, element: usize) -> String {
        if self.shape.is_empty() {
            return String::new();
        }
        let mut rem = element;
        let mut idx = vec![0; self.shape.len()];
        for (axis, size) in self.shape.iter().enumerate().rev() {
            idx[axis] = rem % size;
            rem /= size;
        }
        let parts: Vec<String> = idx.iter().map(|i| i.to_string()).collect();
        format!("[{}]", parts.join(","))
    }
}

/// Named groups of named variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleCollection {
    groups: BTreeMap<GroupKind, BTreeMap<String, Draws>>,
}

impl SampleCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, group: GroupKind, name: impl Into<String>, draws: Draws) {
        self.groups
            .entry(group)
            .or_default()
            .insert(name.into(), draws);
    }

    pub fn get(&self, group: GroupKind, name: &str) -> Option<&Draws> {
        self.groups.get(&group).and_then(|vars| vars.get(name))
    }

    pub fn group(&self, group: GroupKind) -> Option<&BTreeMap<String, Draws>> {
        self.groups.get(&group)
    }

    pub fn has_group(&self, group: GroupKind) -> bool {
        self.groups.get(&group).is_some_and(|g| !g.is_empty())
    }

    /// Groups present, in stable order.
    pub fn group_kinds(&self) -> impl Iterator<Item = GroupKind> + '_ {
        self.groups.keys().copied()
    }

    /// Every `(group, variable, draws)` triple, in stable order.
    pub fn iter(&self) -> impl Iterator<Item = (GroupKind, &str, &Draws)> {
        self.groups.iter().flat_map(|(g, vars)| {
            vars.iter()
                .map(move |(name, draws)| (*g, name.as_str(), draws))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(BTreeMap::is_empty)
    }

    /// Move every group of `other` into this collection.
    pub fn merge(&mut self, other: SampleCollection) {
        for (g, vars) in other.groups {
            self.groups.entry(g).or_default().extend(vars);
        }
    }
}

/// The three artifacts of one model fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    Prior,
    Posterior,
    PosteriorPrediction,
}

impl TraceKind {
    pub const ALL: &'static [TraceKind] = &[
        TraceKind::Prior,
        TraceKind::Posterior,
        TraceKind::PosteriorPrediction,
    ];

    /// File name inside the model directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            TraceKind::Prior => "prior",
            TraceKind::Posterior => "posterior",
            TraceKind::PosteriorPrediction => "posterior_prediction",
        }
    }
}

/// Prior, posterior, and posterior-predictive collections for one fit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceSet {
    pub prior: SampleCollection,
    pub posterior: SampleCollection,
    pub posterior_prediction: SampleCollection,
}

impl TraceSet {
    pub fn get(&self, kind: TraceKind) -> &SampleCollection {
        match kind {
            TraceKind::Prior => &self.prior,
            TraceKind::Posterior => &self.posterior,
            TraceKind::PosteriorPrediction => &self.posterior_prediction,
        }
    }

    pub fn get_mut(&mut self, kind: TraceKind) -> &mut SampleCollection {
        match kind {
            TraceKind::Prior => &mut self.prior,
            TraceKind::Posterior => &mut self.posterior,
            TraceKind::PosteriorPrediction => &mut self.posterior_prediction,
        }
    }
}
