//! Structured event vocabulary for logging.
//!
//! Every pipeline event carries the run id, the model variant when one is
//! in play, and the stage that emitted it.

use serde::{Deserialize, Serialize};

/// Processing stages of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Raw census table cleanup.
    Prepare,
    /// Covariate derivation and grouping.
    Features,
    /// Row filtering and model construction.
    Model,
    /// Prior-predictive, posterior, and posterior-predictive sampling.
    Sample,
    /// Trace persistence.
    Persist,
    /// Diagnostics.
    Summarize,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Prepare => "prepare",
            Stage::Features => "features",
            Stage::Model => "model",
            Stage::Sample => "sample",
            Stage::Persist => "persist",
            Stage::Summarize => "summarize",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    pub const PIPELINE_FINISHED: &str = "pipeline.finished";

    // Config
    pub const CONFIG_LOADED: &str = "config.loaded";

    // Prepare / features
    pub const PARCELS_LOADED: &str = "parcels.loaded";
    pub const OLD_DISTRICTS_MARKED: &str = "old_districts.marked";
    pub const COVARIATES_DERIVED: &str = "covariates.derived";
    pub const GROUPS_ASSIGNED: &str = "groups.assigned";
    pub const TAX_DERIVED: &str = "tax.derived";

    // Model
    pub const ROWS_FILTERED: &str = "rows.filtered";
    pub const ROWS_DROPPED: &str = "rows.dropped";
    pub const MODEL_BUILT: &str = "model.built";

    // Sampling
    pub const PRIOR_DONE: &str = "sampling.prior.done";
    pub const CHAIN_DONE: &str = "sampling.chain.done";
    pub const POSTERIOR_DONE: &str = "sampling.posterior.done";
    pub const PREDICTIVE_DONE: &str = "sampling.predictive.done";

    // Outputs
    pub const TRACE_PERSISTED: &str = "trace.persisted";
    pub const DIAGNOSTICS_WRITTEN: &str = "diagnostics.written";

    pub const VARIANT_FAILED: &str = "variant.failed";
}

/// Correlation fields attached to every event of one run.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Unique ID for this invocation.
    pub run_id: String,
    /// Model variant being processed, if any.
    pub variant: Option<String>,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            variant: None,
        }
    }

    /// A copy of this context scoped to one model variant.
    pub fn with_variant(&self, variant: impl Into<String>) -> Self {
        LogContext {
            run_id: self.run_id.clone(),
            variant: Some(variant.into()),
        }
    }

    /// Variant label for log fields; `-` outside a variant.
    pub fn variant_label(&self) -> &str {
        self.variant.as_deref().unwrap_or("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display_matches_serde() {
        for stage in [Stage::Init, Stage::Features, Stage::Sample, Stage::Summarize] {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage));
        }
    }

    #[test]
    fn test_context_scoping() {
        let ctx = LogContext::new("cg-20261019-143022-a7xq");
        assert_eq!(ctx.variant_label(), "-");
        let scoped = ctx.with_variant("hierarchical_spatial");
        assert_eq!(scoped.run_id, ctx.run_id);
        assert_eq!(scoped.variant_label(), "hierarchical_spatial");
    }

    #[test]
    fn test_event_names() {
        assert_eq!(event_names::PIPELINE_STARTED, "pipeline.started");
        assert_eq!(event_names::POSTERIOR_DONE, "sampling.posterior.done");
        assert_eq!(event_names::TRACE_PERSISTED, "trace.persisted");
    }
}
