//! File I/O utilities with atomic writes
//!
//! Provides safe file operations that won't leave half-written metadata or
//! blobs behind on failure.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::KeepsakeError;

/// Read JSON from a file, returning an error if the file doesn't exist
pub fn read_json_required<T, P>(path: P) -> Result<T, KeepsakeError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let file = File::open(path)
        .map_err(|e| KeepsakeError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| KeepsakeError::Json(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write JSON to a file atomically (write to temp, then rename)
///
/// The file is either completely written or not modified at all.
pub fn write_json_atomic<T, P>(path: P, data: &T) -> Result<(), KeepsakeError>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    ensure_parent(path)?;

    // Temp file must live in the same directory for the rename to be atomic
    let temp_path = path.with_extension("json.tmp");

    let file = File::create(&temp_path)
        .map_err(|e| KeepsakeError::Io(format!("Failed to create temp file: {}", e)))?;

    let mut writer = BufWriter::new(file);
    let written = serde_json::to_writer_pretty(&mut writer, data)
        .map_err(|e| KeepsakeError::Json(format!("Failed to serialize data: {}", e)))
        .and_then(|_| {
            writer
                .flush()
                .map_err(|e| KeepsakeError::Io(format!("Failed to flush data: {}", e)))
        })
        .and_then(|_| {
            writer
                .get_ref()
                .sync_all()
                .map_err(|e| KeepsakeError::Io(format!("Failed to sync data: {}", e)))
        });

    if let Err(e) = written {
        drop(writer);
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    drop(writer);

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        KeepsakeError::Io(format!("Failed to rename temp file: {}", e))
    })?;

    Ok(())
}

/// Copy a file and flush the copy to disk, creating parent directories
///
/// Returns the number of bytes copied.
pub fn copy_file_synced(from: &Path, to: &Path) -> Result<u64, KeepsakeError> {
    ensure_parent(to)?;

    let bytes = fs::copy(from, to).map_err(|e| {
        KeepsakeError::Io(format!(
            "Failed to copy {} to {}: {}",
            from.display(),
            to.display(),
            e
        ))
    })?;

    File::open(to)
        .and_then(|f| f.sync_all())
        .map_err(|e| KeepsakeError::Io(format!("Failed to sync {}: {}", to.display(), e)))?;

    Ok(bytes)
}

/// Delete regular files in `dir` last modified before `cutoff`
///
/// Best-effort: files that cannot be inspected or removed are skipped. A
/// missing directory yields an empty list.
pub fn remove_files_older_than(
    dir: &Path,
    cutoff: std::time::SystemTime,
) -> Result<Vec<PathBuf>, KeepsakeError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for entry in fs::read_dir(dir)
        .map_err(|e| KeepsakeError::Io(format!("Failed to read {}: {}", dir.display(), e)))?
    {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if modified < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }

    Ok(removed)
}

fn ensure_parent(path: &Path) -> Result<(), KeepsakeError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                KeepsakeError::Io(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}
