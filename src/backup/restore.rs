//! Snapshot restoration for Keepsake
//!
//! Restores file entries first, then registry entries. The stored snapshot is
//! only read, never modified.

use std::fmt;
use std::fs;
use std::path::Path;

use super::manager::BackupManager;
use super::snapshot::{Snapshot, SnapshotTarget};
use crate::error::{EntryRef, KeepsakeError, KeepsakeResult};
use crate::storage::file_io::copy_file_synced;

/// Scope of the snapshots taken right before a restore
pub const PRE_RESTORE_SCOPE: &str = "pre_restore";

/// How restore reacts to a failing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMode {
    /// Record the failure and continue with the remaining entries
    #[default]
    BestEffort,
    /// Abort on the first failure
    Strict,
}

impl fmt::Display for RestoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreMode::BestEffort => f.write_str("best-effort"),
            RestoreMode::Strict => f.write_str("strict"),
        }
    }
}

/// An entry that could not be restored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreFailure {
    pub entry: EntryRef,
    pub reason: String,
}

/// Result of a restore operation
#[derive(Debug, Clone)]
pub struct RestoreResult {
    /// Snapshot the entries came from
    pub snapshot_id: String,
    /// Mode the restore ran in
    pub mode: RestoreMode,
    /// Entries written back, in restore order
    pub restored: Vec<EntryRef>,
    /// Entries that failed (best-effort mode only)
    pub failures: Vec<RestoreFailure>,
}

impl RestoreResult {
    /// Check if every entry was restored
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Get a summary of what was restored
    pub fn summary(&self) -> String {
        if self.is_complete() {
            format!(
                "Restored {} entr{} from {} ({})",
                self.restored.len(),
                if self.restored.len() == 1 { "y" } else { "ies" },
                self.snapshot_id,
                self.mode
            )
        } else {
            format!(
                "Partially restored {} ({}): {} restored, {} failed",
                self.snapshot_id,
                self.mode,
                self.restored.len(),
                self.failures.len()
            )
        }
    }
}

impl BackupManager {
    /// Restore the live targets captured by snapshot `id`
    ///
    /// Fails with `SnapshotNotFound` or `SnapshotCorrupt` before anything is
    /// written. In strict mode the first failing entry aborts with
    /// `KeepsakeError::Restore`, which lists the entries already restored.
    pub fn restore_snapshot(&self, id: &str, mode: RestoreMode) -> KeepsakeResult<RestoreResult> {
        let snapshot = self.verify_snapshot(id)?;

        let mut result = RestoreResult {
            snapshot_id: snapshot.id.clone(),
            mode,
            restored: Vec::new(),
            failures: Vec::new(),
        };

        let file_steps = snapshot.files.iter().map(|entry| {
            let stored = snapshot.stored_file_path(entry);
            let outcome = restore_file(&stored, &entry.original_path);
            (entry.entry_ref(), outcome)
        });

        let registry_steps = snapshot.registry_entries.iter().map(|entry| {
            let outcome =
                self.registry
                    .write_value(&entry.key_path, &entry.value_name, &entry.value);
            (entry.entry_ref(), outcome)
        });

        // Iterators are lazy: in strict mode nothing after the first failure runs
        for (entry, outcome) in file_steps.chain(registry_steps) {
            match outcome {
                Ok(()) => {
                    tracing::debug!("Restored {}", entry);
                    result.restored.push(entry);
                }
                Err(e) => {
                    tracing::warn!("Failed to restore {} from {}: {}", entry, snapshot.id, e);
                    if mode == RestoreMode::Strict {
                        return Err(KeepsakeError::Restore {
                            id: snapshot.id.clone(),
                            restored: result.restored,
                            failed: entry,
                            reason: e.to_string(),
                        });
                    }
                    result.failures.push(RestoreFailure {
                        entry,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            snapshot = %result.snapshot_id,
            restored = result.restored.len(),
            failed = result.failures.len(),
            mode = %mode,
            "Restore finished"
        );

        Ok(result)
    }

    /// Capture the live state of the targets `snapshot` would overwrite
    ///
    /// Targets that do not currently exist are skipped. Returns `None` when
    /// nothing is left to capture.
    pub fn snapshot_current_state(
        &self,
        snapshot: &Snapshot,
        scope: &str,
    ) -> KeepsakeResult<Option<Snapshot>> {
        let targets: Vec<SnapshotTarget> = snapshot
            .targets()
            .into_iter()
            .filter(|target| match target {
                SnapshotTarget::File(path) => path.is_file(),
                SnapshotTarget::RegistryValue {
                    key_path,
                    value_name,
                } => self.registry.read_value(key_path, value_name).is_ok(),
            })
            .collect();

        if targets.is_empty() {
            return Ok(None);
        }

        self.create_snapshot(
            scope,
            &targets,
            &format!("State before restoring {}", snapshot.id),
        )
        .map(Some)
    }
}

/// Copy a blob over its original path through a sibling temp file
fn restore_file(stored: &Path, original: &Path) -> KeepsakeResult<()> {
    let file_name = original
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| KeepsakeError::Io(format!("Invalid target path {}", original.display())))?;
    let temp = original.with_file_name(format!(".{}.keepsake-restore", file_name));

    copy_file_synced(stored, &temp)?;
    fs::rename(&temp, original).map_err(|e| {
        let _ = fs::remove_file(&temp);
        KeepsakeError::Io(format!("Failed to replace {}: {}", original.display(), e))
    })
}
