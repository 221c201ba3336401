//! Loading worker definitions from authored files.
//!
//! A workers directory holds `*.json`, `*.yaml` or `*.yml` files. Each file
//! contains either one definition or a list of them. Files are read in name
//! order so the resulting manifest is stable across machines.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::contract::{WorkerDefinition, WorkerManifest};
use super::validate::{ValidationError, parse};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Syntax { path: PathBuf, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Reads every worker file in `dir` into a manifest.
pub fn load_dir(dir: &Path) -> Result<WorkerManifest, LoadError> {
    let entries = std::fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && is_worker_file(&path) {
            files.push(path);
        }
    }
    files.sort();

    let mut workers = Vec::new();
    for file in &files {
        workers.extend(load_file(file)?);
    }
    debug!(dir = %dir.display(), files = files.len(), workers = workers.len(), "Loaded worker definitions");

    Ok(WorkerManifest::new(workers)?)
}

/// Reads the definitions in one file.
///
/// Each definition is labelled with the file name, plus its index when the
/// file holds a list.
pub fn load_file(path: &Path) -> Result<Vec<WorkerDefinition>, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let raw: Value = match extension(path) {
        Some("json") => serde_json::from_str(&text).map_err(|e| LoadError::Syntax {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?,
        _ => serde_yaml::from_str(&text).map_err(|e| LoadError::Syntax {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?,
    };

    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    match &raw {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse(item, &format!("{}[{}]", label, i)).map_err(LoadError::from))
            .collect(),
        _ => Ok(vec![parse(&raw, &label)?]),
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

fn is_worker_file(path: &Path) -> bool {
    matches!(extension(path), Some("json" | "yaml" | "yml"))
}
