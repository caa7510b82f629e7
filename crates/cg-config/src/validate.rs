//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::pipeline::{DistrictFilter, PipelineConfig};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

impl From<ValidationError> for cg_common::Error {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidValue { field, message } => {
                cg_common::Error::InvalidOption { field, message }
            }
            other => cg_common::Error::Config(other.to_string()),
        }
    }
}

fn check_range_f64(field: &str, value: f64, lo: f64, hi: f64) -> ValidationResult<()> {
    if !value.is_finite() || value < lo || value > hi {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be in [{}, {}], got {}", lo, hi, value),
        });
    }
    Ok(())
}

fn check_range_usize(field: &str, value: usize, lo: usize, hi: usize) -> ValidationResult<()> {
    if value < lo || value > hi {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be in [{}, {}], got {}", lo, hi, value),
        });
    }
    Ok(())
}

fn check_positive(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be positive, got {}", value),
        });
    }
    Ok(())
}

/// Validate a pipeline configuration semantically.
pub fn validate_config(config: &PipelineConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if !config.min_density.is_finite() || config.min_density < 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "min_density".to_string(),
            message: format!("Must be a finite value >= 0, got {}", config.min_density),
        });
    }

    check_range_usize("n_clusters", config.n_clusters, 5, 25)?;
    check_range_usize("kmeans_restarts", config.kmeans_restarts, 1, 100)?;

    if config.seed > 1000 {
        return Err(ValidationError::InvalidValue {
            field: "seed".to_string(),
            message: format!("Must be in [0, 1000], got {}", config.seed),
        });
    }

    check_range_usize("prior_samples", config.prior_samples, 10, 2000)?;
    check_range_usize("draws", config.draws, 10, 2000)?;
    check_range_usize("tune", config.tune, 10, 2000)?;
    check_range_f64("target_accept", config.target_accept, 0.5, 0.99)?;
    check_range_usize("chains", config.chains, 1, 16)?;
    check_range_usize("max_treedepth", config.max_treedepth, 1, 15)?;
    check_range_f64(
        "max_divergence_fraction",
        config.max_divergence_fraction,
        0.0,
        1.0,
    )?;

    check_positive("nugget", config.nugget)?;
    check_positive("distance_scale", config.distance_scale)?;
    check_range_usize("subsample_stride", config.subsample_stride, 1, usize::MAX)?;

    if !(config.hdi_prob > 0.0 && config.hdi_prob < 1.0) {
        return Err(ValidationError::InvalidValue {
            field: "hdi_prob".to_string(),
            message: format!("Must be in (0, 1), got {}", config.hdi_prob),
        });
    }

    check_positive("priors.noise_rate", config.priors.noise_rate)?;
    check_positive("priors.concentration_rate", config.priors.concentration_rate)?;
    check_positive("priors.eta_sq_rate", config.priors.eta_sq_rate)?;
    check_positive("priors.rho_sq_rate", config.priors.rho_sq_rate)?;

    if config.variants.is_empty() {
        return Err(ValidationError::SemanticError(
            "variants must name at least one model".to_string(),
        ));
    }
    let mut seen = std::collections::BTreeSet::new();
    for variant in &config.variants {
        if !seen.insert(*variant) {
            return Err(ValidationError::SemanticError(format!(
                "variant {} listed more than once",
                variant
            )));
        }
    }

    if matches!(&config.districts, DistrictFilter::Only(labels) if labels.is_empty()) {
        return Err(ValidationError::SemanticError(
            "districts allow-list is empty; use \"all\" or name at least one district"
                .to_string(),
        ));
    }

    Ok(())
}
