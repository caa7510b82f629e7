//! Loading configuration files (JSON or TOML, chosen by extension).

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pipeline::PipelineConfig;
use crate::resolve::{resolve_config, ConfigSource};
use crate::snapshot::ConfigSnapshot;
use crate::validate::{validate_config, ValidationError};

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid JSON in config file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid TOML in config file {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unsupported config extension for {}; use .json or .toml", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("Semantic validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for cg_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation(inner) => inner.into(),
            other => cg_common::Error::Config(other.to_string()),
        }
    }
}

/// A validated configuration with its provenance.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PipelineConfig,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
    pub snapshot: ConfigSnapshot,
}

/// Parse a configuration from a string in the given format.
pub fn parse_config(content: &str, path: &Path) -> Result<PipelineConfig, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        }),
        Some("toml") => toml::from_str(content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        }),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Load and validate a configuration file.
pub fn load_config_file(path: &Path) -> Result<(PipelineConfig, String), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&content, path)?;
    validate_config(&config)?;
    Ok((config, content))
}

/// Resolve, load, and validate the configuration for a run.
///
/// `base` replaces the built-in defaults when no file is found (used for
/// presets).
pub fn load_config(
    cli_path: Option<&Path>,
    base: Option<PipelineConfig>,
) -> Result<LoadedConfig, ConfigError> {
    let resolved = resolve_config(cli_path);
    match resolved.path {
        Some(path) => {
            let (config, raw) = load_config_file(&path)?;
            let snapshot = ConfigSnapshot::new(&config, Some(&path), resolved.source, Some(&raw));
            Ok(LoadedConfig {
                config,
                path: Some(path),
                source: resolved.source,
                snapshot,
            })
        }
        None => {
            let config = base.unwrap_or_default();
            validate_config(&config)?;
            let snapshot = ConfigSnapshot::new(&config, None, resolved.source, None);
            Ok(LoadedConfig {
                config,
                path: None,
                source: resolved.source,
                snapshot,
            })
        }
    }
}
