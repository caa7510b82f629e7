//! On-disk layout of a model's traces.
//!
//! A model directory holds exactly three files: `prior`, `posterior`, and
//! `posterior_prediction`. Persisting clears the directory first, so a
//! re-run never mixes artifacts from different fits.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::collection::{TraceKind, TraceSet};
use crate::error::TraceError;
use crate::reader::read_collection;
use crate::writer::{write_collection, WriterConfig};

/// Remove every entry inside `dir`, creating it if needed.
pub fn clear_directory(dir: &Path) -> Result<(), TraceError> {
    fs::create_dir_all(dir)?;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Path of one artifact inside a model directory.
pub fn artifact_path(dir: &Path, kind: TraceKind) -> PathBuf {
    dir.join(kind.file_name())
}

/// Clear `dir` and write the three trace artifacts.
pub fn persist(traces: &TraceSet, dir: &Path) -> Result<Vec<PathBuf>, TraceError> {
    persist_with(traces, dir, &WriterConfig::default())
}

pub fn persist_with(
    traces: &TraceSet,
    dir: &Path,
    config: &WriterConfig,
) -> Result<Vec<PathBuf>, TraceError> {
    clear_directory(dir)?;
    let mut written = Vec::with_capacity(TraceKind::ALL.len());
    for kind in TraceKind::ALL {
        written.push(write_collection(
            &artifact_path(dir, *kind),
            traces.get(*kind),
            config,
        )?);
    }
    info!(dir = %dir.display(), files = written.len(), "traces persisted");
    Ok(written)
}

/// Load the three artifacts of a model directory.
pub fn load(dir: &Path) -> Result<TraceSet, TraceError> {
    let mut traces = TraceSet::default();
    for kind in TraceKind::ALL {
        *traces.get_mut(*kind) = read_collection(&artifact_path(dir, *kind))?;
    }
    Ok(traces)
}

/// Load a single artifact.
pub fn load_kind(dir: &Path, kind: TraceKind) -> Result<crate::SampleCollection, TraceError> {
    read_collection(&artifact_path(dir, kind))
}
