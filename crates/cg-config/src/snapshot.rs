//! Configuration snapshots for run reproducibility.
//!
//! A snapshot captures the exact configuration a run used, so a set of traces
//! and reports can be tied back to the options that produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::pipeline::PipelineConfig;
use crate::resolve::ConfigSource;

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Path the configuration was loaded from.
    #[serde(default)]
    pub path: Option<String>,

    /// Source of the configuration.
    pub source: String,

    /// SHA-256 of the raw file content, or of the canonical JSON for defaults.
    pub sha256: String,

    /// The effective configuration.
    pub config: PipelineConfig,
}

impl ConfigSnapshot {
    /// Create a snapshot from a loaded configuration.
    ///
    /// `raw` is the file content when the config came from a file.
    pub fn new(
        config: &PipelineConfig,
        path: Option<&std::path::Path>,
        source: ConfigSource,
        raw: Option<&str>,
    ) -> Self {
        let sha256 = match raw {
            Some(content) => hash_content(content),
            None => hash_content(&serde_json::to_string(config).unwrap_or_default()),
        };
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: config.schema_version.clone(),
            path: path.map(|p| p.display().to_string()),
            source: source.to_string(),
            sha256,
            config: config.clone(),
        }
    }

    /// Whether two snapshots describe the same configuration content.
    pub fn same_content(&self, other: &ConfigSnapshot) -> bool {
        self.sha256 == other.sha256
    }
}

/// SHA-256 of a string, hex encoded.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
