//! Configuration presets for common run profiles.
//!
//! Provides pre-built configurations for:
//! - Quick: smoke runs with short chains
//! - Default: the built-in defaults
//! - Paper: the full sampling budget of the published analysis

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pipeline::{ModelVariant, PipelineConfig};

/// Available configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetName {
    /// Short chains for smoke tests and CI
    Quick,
    /// Built-in defaults
    Default,
    /// Full sampling budget, every variant
    Paper,
}

impl PresetName {
    /// All available preset names.
    pub const ALL: &'static [PresetName] = &[PresetName::Quick, PresetName::Default, PresetName::Paper];

    /// Get preset name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Quick => "quick",
            PresetName::Default => "default",
            PresetName::Paper => "paper",
        }
    }

    /// Parse preset name from string.
    pub fn parse(s: &str) -> Option<PresetName> {
        match s.to_lowercase().as_str() {
            "quick" | "smoke" | "ci" => Some(PresetName::Quick),
            "default" | "defaults" => Some(PresetName::Default),
            "paper" | "full" | "publication" => Some(PresetName::Paper),
            _ => None,
        }
    }

    /// Get a description of the preset.
    pub fn description(&self) -> &'static str {
        match self {
            PresetName::Quick => "100 draws, 100 tune, 2 chains; for smoke runs only",
            PresetName::Default => "Built-in defaults: two non-spatial variants, 4 chains",
            PresetName::Paper => "1000 prior samples, 1000 draws, 1000 tune, target_accept 0.9, all variants",
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PresetName {
    type Err = PresetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresetName::parse(s).ok_or_else(|| PresetError::UnknownPreset(s.to_string()))
    }
}

/// Errors related to preset operations.
#[derive(Debug, Clone)]
pub enum PresetError {
    /// Unknown preset name.
    UnknownPreset(String),
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetError::UnknownPreset(name) => {
                write!(
                    f,
                    "Unknown preset '{}'. Available: {}",
                    name,
                    PresetName::ALL
                        .iter()
                        .map(|p| p.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        }
    }
}

impl std::error::Error for PresetError {}

/// Summary of a preset for listing.
#[derive(Debug, Clone, Serialize)]
pub struct PresetInfo {
    pub name: PresetName,
    pub description: &'static str,
}

/// List every preset with its description.
pub fn list_presets() -> Vec<PresetInfo> {
    PresetName::ALL
        .iter()
        .map(|name| PresetInfo {
            name: *name,
            description: name.description(),
        })
        .collect()
}

/// Build the configuration for a preset.
pub fn get_preset(name: PresetName) -> PipelineConfig {
    match name {
        PresetName::Quick => PipelineConfig {
            prior_samples: 100,
            draws: 100,
            tune: 100,
            chains: 2,
            max_treedepth: 8,
            subsample_stride: 5,
            ..PipelineConfig::default()
        },
        PresetName::Default => PipelineConfig::default(),
        PresetName::Paper => PipelineConfig {
            prior_samples: 1000,
            draws: 1000,
            tune: 1000,
            target_accept: 0.9,
            variants: ModelVariant::ALL.to_vec(),
            ..PipelineConfig::default()
        },
    }
}
