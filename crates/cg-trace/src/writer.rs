//! Batched Parquet writer for trace files.
//!
//! Rows are buffered and flushed in record batches to a temporary file that
//! is renamed over the final path on close, so a crashed run never leaves a
//! truncated artifact under the final name.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, RecordBatch, StringArray, UInt32Array};
use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, Encoding, ZstdLevel};
use parquet::file::properties::{WriterProperties, WriterVersion};
use tracing::debug;

use crate::collection::SampleCollection;
use crate::error::TraceError;
use crate::schema::schema_for;

/// Configuration for the batched writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Compression codec.
    pub compression: Compression,

    /// Maximum rows per Parquet row group.
    pub row_group_size: usize,

    /// Maximum rows to buffer before flushing.
    pub batch_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            compression: ZstdLevel::try_new(3)
                .map(Compression::ZSTD)
                .unwrap_or(Compression::SNAPPY),
            row_group_size: 1024 * 1024,
            batch_size: crate::DEFAULT_BATCH_SIZE,
        }
    }
}

impl WriterConfig {
    /// Use snappy compression instead of zstd.
    pub fn with_snappy(mut self) -> Self {
        self.compression = Compression::SNAPPY;
        self
    }

    /// Set custom batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set custom row group size.
    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }
}

/// Batched writer for a single trace file.
pub struct TraceWriter {
    schema: Arc<Schema>,
    config: WriterConfig,
    buffer: Vec<RecordBatch>,
    rows_buffered: usize,
    output_path: PathBuf,
    temp_path: Option<PathBuf>,
    writer: Option<ArrowWriter<File>>,
}

impl TraceWriter {
    /// Create a writer targeting `output_path`.
    pub fn new(output_path: PathBuf, schema: Arc<Schema>, config: WriterConfig) -> Self {
        TraceWriter {
            schema,
            config,
            buffer: Vec::new(),
            rows_buffered: 0,
            output_path,
            temp_path: None,
            writer: None,
        }
    }

    /// Write a record batch to the buffer.
    ///
    /// If the buffer exceeds the batch size, it will be flushed to disk.
    pub fn write(&mut self, batch: RecordBatch) -> Result<(), TraceError> {
        let num_rows = batch.num_rows();
        self.buffer.push(batch);
        self.rows_buffered += num_rows;

        if self.rows_buffered >= self.config.batch_size {
            self.flush()?;
        }

        Ok(())
    }

    /// Flush buffered data to disk.
    pub fn flush(&mut self) -> Result<(), TraceError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        if self.writer.is_none() {
            self.init_writer()?;
        }

        let writer = self.writer.as_mut().ok_or(TraceError::NotInitialized)?;
        for batch in self.buffer.drain(..) {
            writer.write(&batch)?;
        }

        self.rows_buffered = 0;
        Ok(())
    }

    /// Close the writer and move the file into place.
    ///
    /// A writer that never received a batch still produces a valid, empty
    /// file so the schema metadata is persisted.
    pub fn close(mut self) -> Result<PathBuf, TraceError> {
        self.flush()?;
        if self.writer.is_none() {
            self.init_writer()?;
        }

        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }

        let temp_path = self.temp_path.take().ok_or(TraceError::NotInitialized)?;
        atomic_rename(&temp_path, &self.output_path)?;
        Ok(self.output_path.clone())
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn init_writer(&mut self) -> Result<(), TraceError> {
        if let Some(parent) = self.output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = temp_path_for(&self.output_path);
        let file = File::create(&temp_path)?;

        let props = WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(self.config.compression)
            .set_max_row_group_size(self.config.row_group_size)
            // group/variable repeat heavily
            .set_dictionary_enabled(true)
            .set_encoding(Encoding::PLAIN)
            .build();

        let writer = ArrowWriter::try_new(file, self.schema.clone(), Some(props))?;
        self.writer = Some(writer);
        self.temp_path = Some(temp_path);
        Ok(())
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        // Unfinished writers leave no temp file behind.
        if let Some(temp) = self.temp_path.take() {
            self.writer.take();
            let _ = fs::remove_file(temp);
        }
    }
}

fn temp_path_for(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    output.with_file_name(name)
}

/// Helper to rename temp file to final path atomically.
pub fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<(), TraceError> {
    fs::rename(temp_path, final_path)?;
    Ok(())
}

/// Encode a collection as long-format record batches of at most `batch_rows`
/// rows each.
pub fn encode_collection(
    collection: &SampleCollection,
    schema: &Arc<Schema>,
    batch_rows: usize,
) -> Result<Vec<RecordBatch>, TraceError> {
    let batch_rows = batch_rows.max(1);
    let mut batches = Vec::new();
    let mut rows = RowBuffer::default();

    for (group, name, draws) in collection.iter() {
        for chain in 0..draws.chains {
            for draw in 0..draws.draws {
                for (element, value) in draws.draw(chain, draw).iter().enumerate() {
                    rows.push(group.as_str(), name, chain, draw, element, *value);
                    if rows.len() >= batch_rows {
                        batches.push(rows.take_batch(schema)?);
                    }
                }
            }
        }
    }
    if !rows.value.is_empty() {
        batches.push(rows.take_batch(schema)?);
    }
    Ok(batches)
}

#[derive(Default)]
struct RowBuffer {
    group: Vec<&'static str>,
    variable: Vec<String>,
    chain: Vec<u32>,
    draw: Vec<u32>,
    element: Vec<u32>,
    value: Vec<f64>,
}

impl RowBuffer {
    fn len(&self) -> usize {
        self.value.len()
    }

    fn push(
        &mut self,
        group: &'static str,
        variable: &str,
        chain: usize,
        draw: usize,
        element: usize,
        value: f64,
    ) {
        self.group.push(group);
        self.variable.push(variable.to_string());
        self.chain.push(chain as u32);
        self.draw.push(draw as u32);
        self.element.push(element as u32);
        self.value.push(value);
    }

    fn take_batch(&mut self, schema: &Arc<Schema>) -> Result<RecordBatch, TraceError> {
        let taken = std::mem::take(self);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(taken.group)),
            Arc::new(StringArray::from(taken.variable)),
            Arc::new(UInt32Array::from(taken.chain)),
            Arc::new(UInt32Array::from(taken.draw)),
            Arc::new(UInt32Array::from(taken.element)),
            Arc::new(Float64Array::from(taken.value)),
        ];
        Ok(RecordBatch::try_new(schema.clone(), columns)?)
    }
}

/// Write one collection to `path` (atomically).
pub fn write_collection(
    path: &Path,
    collection: &SampleCollection,
    config: &WriterConfig,
) -> Result<PathBuf, TraceError> {
    let schema = schema_for(collection)?;
    let batches = encode_collection(collection, &schema, config.batch_size)?;
    let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();

    let mut writer = TraceWriter::new(path.to_path_buf(), schema, config.clone());
    for batch in batches {
        writer.write(batch)?;
    }
    let out = writer.close()?;
    debug!(path = %out.display(), rows, "trace file written");
    Ok(out)
}
