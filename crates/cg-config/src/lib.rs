//! Confession-geo configuration loading and validation.
//!
//! This crate provides:
//! - The typed `PipelineConfig` passed to every pipeline component
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation of option ranges
//! - Named presets
//! - Config snapshots stored next to run outputs

pub mod load;
pub mod pipeline;
pub mod preset;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use load::{load_config, load_config_file, ConfigError, LoadedConfig};
pub use pipeline::{DistrictFilter, GroupingMethod, ModelVariant, PipelineConfig, PriorSettings};
pub use preset::{get_preset, list_presets, PresetName};
pub use resolve::{resolve_config, ConfigPath, ConfigSource};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
