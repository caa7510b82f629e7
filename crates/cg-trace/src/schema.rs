//! Arrow schema for persisted traces.
//!
//! Every trace file is a long table with one row per scalar value:
//! - `group`: sample group (`posterior`, `sample_stats`, ...)
//! - `variable`: variable name
//! - `chain`, `draw`, `element`: position of the value
//! - `value`: the sampled value
//!
//! Variable shapes travel in the schema metadata under [`SHAPES_KEY`] so a
//! reader can rebuild multi-dimensional draws.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema};
use serde::{Deserialize, Serialize};

use crate::collection::SampleCollection;

/// Metadata key holding the JSON shape table.
pub const SHAPES_KEY: &str = "cg.shapes";

/// Metadata key holding the trace format version.
pub const VERSION_KEY: &str = "cg.schema_version";

/// Layout of one variable, keyed in metadata by `group/variable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableLayout {
    pub chains: usize,
    pub draws: usize,
    pub shape: Vec<usize>,
}

/// Column layout shared by every trace file.
pub fn trace_schema() -> Schema {
    Schema::new(vec![
        Field::new("group", DataType::Utf8, false),
        Field::new("variable", DataType::Utf8, false),
        Field::new("chain", DataType::UInt32, false),
        Field::new("draw", DataType::UInt32, false),
        Field::new("element", DataType::UInt32, false),
        Field::new("value", DataType::Float64, false),
    ])
}

/// Metadata key for a variable.
pub fn layout_key(group: &str, variable: &str) -> String {
    format!("{}/{}", group, variable)
}

/// Shape table for a collection.
pub fn layouts(collection: &SampleCollection) -> BTreeMap<String, VariableLayout> {
    collection
        .iter()
        .map(|(group, name, draws)| {
            (
                layout_key(group.as_str(), name),
                VariableLayout {
                    chains: draws.chains,
                    draws: draws.draws,
                    shape: draws.shape.clone(),
                },
            )
        })
        .collect()
}

/// The trace schema carrying the collection's shape table.
pub fn schema_for(collection: &SampleCollection) -> Result<Arc<Schema>, serde_json::Error> {
    let mut metadata = HashMap::new();
    metadata.insert(
        SHAPES_KEY.to_string(),
        serde_json::to_string(&layouts(collection))?,
    );
    metadata.insert(VERSION_KEY.to_string(), crate::SCHEMA_VERSION.to_string());
    Ok(Arc::new(trace_schema().with_metadata(metadata)))
}
