//! Reading trace files back into sample collections.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use arrow::array::{Array, Float64Array, RecordBatch, StringArray, UInt32Array};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::collection::{Draws, GroupKind, SampleCollection};
use crate::error::TraceError;
use crate::schema::{layout_key, VariableLayout, SHAPES_KEY, VERSION_KEY};

/// Read a trace file written by [`crate::writer::write_collection`].
pub fn read_collection(path: &Path) -> Result<SampleCollection, TraceError> {
    if !path.exists() {
        return Err(TraceError::MissingArtifact(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let metadata = builder.schema().metadata().clone();

    let version = metadata
        .get(VERSION_KEY)
        .ok_or_else(|| TraceError::Corrupt(format!("missing {} metadata", VERSION_KEY)))?;
    if version != crate::SCHEMA_VERSION {
        return Err(TraceError::Version {
            found: version.clone(),
            expected: crate::SCHEMA_VERSION.to_string(),
        });
    }
    let shapes_json = metadata
        .get(SHAPES_KEY)
        .ok_or_else(|| TraceError::Corrupt(format!("missing {} metadata", SHAPES_KEY)))?;
    let layouts: BTreeMap<String, VariableLayout> = serde_json::from_str(shapes_json)?;

    let mut vars: BTreeMap<String, Draws> = layouts
        .iter()
        .map(|(key, l)| (key.clone(), Draws::zeros(l.chains, l.draws, l.shape.clone())))
        .collect();

    for batch in builder.build()? {
        fill_from_batch(&batch?, &mut vars)?;
    }

    let mut collection = SampleCollection::new();
    for (key, draws) in vars {
        let (group, name) = key
            .split_once('/')
            .ok_or_else(|| TraceError::Corrupt(format!("bad variable key {}", key)))?;
        let group = GroupKind::parse(group)
            .ok_or_else(|| TraceError::Corrupt(format!("unknown group {}", group)))?;
        collection.insert(group, name, draws);
    }
    Ok(collection)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, TraceError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| TraceError::Corrupt(format!("column {} missing or mistyped", name)))
}

fn fill_from_batch(batch: &RecordBatch, vars: &mut BTreeMap<String, Draws>) -> Result<(), TraceError> {
    let group = column::<StringArray>(batch, "group")?;
    let variable = column::<StringArray>(batch, "variable")?;
    let chain = column::<UInt32Array>(batch, "chain")?;
    let draw = column::<UInt32Array>(batch, "draw")?;
    let element = column::<UInt32Array>(batch, "element")?;
    let value = column::<Float64Array>(batch, "value")?;

    for row in 0..batch.num_rows() {
        let key = layout_key(group.value(row), variable.value(row));
        let draws = vars
            .get_mut(&key)
            .ok_or_else(|| TraceError::Corrupt(format!("no layout recorded for {}", key)))?;
        let (c, d, e) = (
            chain.value(row) as usize,
            draw.value(row) as usize,
            element.value(row) as usize,
        );
        if c >= draws.chains || d >= draws.draws || e >= draws.element_count() {
            return Err(TraceError::Shape {
                variable: key,
                message: format!("index ({}, {}, {}) outside layout", c, d, e),
            });
        }
        draws.draw_mut(c, d)[e] = value.value(row);
    }
    Ok(())
}
