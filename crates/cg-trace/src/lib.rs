//! Confession-geo trace storage.
//!
//! This crate provides:
//! - In-memory sample collections (groups → variables → chain/draw values)
//! - The Arrow schema used for persisted traces
//! - Batched Parquet writer with compression and atomic rename
//! - The three-artifact model directory layout

pub mod collection;
pub mod error;
pub mod reader;
pub mod schema;
pub mod store;
pub mod writer;

pub use collection::{Draws, GroupKind, SampleCollection, TraceKind, TraceSet};
pub use error::TraceError;
pub use reader::read_collection;
pub use schema::{trace_schema, VariableLayout, SHAPES_KEY, VERSION_KEY};
pub use store::{artifact_path, clear_directory, load, load_kind, persist, persist_with};
pub use writer::{write_collection, TraceWriter, WriterConfig};

/// Schema version for trace files.
pub const SCHEMA_VERSION: &str = cg_common::SCHEMA_VERSION;

/// Default rows per record batch.
pub const DEFAULT_BATCH_SIZE: usize = 65_536;
