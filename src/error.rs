//! Custom error types for Keepsake
//!
//! This module defines the error hierarchy for the snapshot and update
//! subsystems using thiserror for ergonomic error definitions.

use std::fmt;

use thiserror::Error;

/// An entry of a snapshot, as reported by restore errors and results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryRef {
    /// A file entry, identified by its original path
    File(String),
    /// A registry entry, identified by key path and value name
    Registry { key_path: String, value_name: String },
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryRef::File(path) => write!(f, "file {}", path),
            EntryRef::Registry {
                key_path,
                value_name,
            } => write!(f, "registry {}\\{}", key_path, value_name),
        }
    }
}

/// The main error type for Keepsake operations
#[derive(Error, Debug)]
pub enum KeepsakeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Registry access errors
    #[error("Registry error: {0}")]
    Registry(String),

    /// Snapshot creation failed; nothing was recorded
    #[error("Snapshot failed for {target}: {reason}")]
    Snapshot { target: String, reason: String },

    /// No snapshot metadata record matches the identifier
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Metadata parses but a referenced blob is missing
    #[error("Snapshot {id} is corrupt: missing stored file(s) {}", .missing.join(", "))]
    SnapshotCorrupt { id: String, missing: Vec<String> },

    /// Strict restore aborted on the first failing entry
    #[error("Restore of {id} aborted at {failed}: {reason} ({} entries already restored)", .restored.len())]
    Restore {
        id: String,
        restored: Vec<EntryRef>,
        failed: EntryRef,
        reason: String,
    },

    /// Update check could not be completed
    #[error("Update check failed: {reason}. Check manually at {manual_url}")]
    CheckFailed { reason: String, manual_url: String },

    /// Downloaded artifact does not match what the server advertised
    #[error("Download integrity check failed: {0}")]
    DownloadIntegrity(String),

    /// Download cancelled by the caller
    #[error("Download cancelled after {0} bytes")]
    DownloadCancelled(u64),

    /// Generic network failure outside the update check
    #[error("Network error: {0}")]
    Network(String),

    /// The self-replace handoff could not be staged
    #[error("Install failed: {0}")]
    Install(String),

    /// A required update was declined
    #[error("Update to {version} is required. Download it manually from {manual_url}")]
    UpdateDeclined { version: String, manual_url: String },

    /// Version string could not be parsed
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// Update flow was driven out of order
    #[error("Invalid update state transition: {from} -> {to}")]
    InvalidState { from: String, to: String },
}

impl KeepsakeError {
    /// Create a snapshot error for a target
    pub fn snapshot(target: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::Snapshot {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SnapshotNotFound(_))
    }

    /// Check if this is a corrupt snapshot error
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::SnapshotCorrupt { .. })
    }

    /// Check if this error ends the process under the forced update policy
    pub fn is_update_declined(&self) -> bool {
        matches!(self, Self::UpdateDeclined { .. })
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_update_declined() {
            2
        } else {
            1
        }
    }
}

impl From<std::io::Error> for KeepsakeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for KeepsakeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for Keepsake operations
pub type KeepsakeResult<T> = Result<T, KeepsakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KeepsakeError::Config("test error".into());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_not_found_error() {
        let err = KeepsakeError::SnapshotNotFound("editor_backup_1".into());
        assert_eq!(err.to_string(), "Snapshot not found: editor_backup_1");
        assert!(err.is_not_found());
        assert!(!err.is_corrupt());
    }

    #[test]
    fn test_corrupt_error_lists_missing_blobs() {
        let err = KeepsakeError::SnapshotCorrupt {
            id: "editor_backup_1".into(),
            missing: vec!["0_a.json".into(), "1_b.db".into()],
        };
        assert_eq!(
            err.to_string(),
            "Snapshot editor_backup_1 is corrupt: missing stored file(s) 0_a.json, 1_b.db"
        );
    }

    #[test]
    fn test_restore_error_counts_restored_entries() {
        let err = KeepsakeError::Restore {
            id: "s".into(),
            restored: vec![EntryRef::File("a".into())],
            failed: EntryRef::Registry {
                key_path: "HKCU\\Software\\X".into(),
                value_name: "V".into(),
            },
            reason: "denied".into(),
        };
        let text = err.to_string();
        assert!(text.contains("registry HKCU\\Software\\X\\V"));
        assert!(text.contains("1 entries already restored"));
    }

    #[test]
    fn test_exit_codes() {
        let declined = KeepsakeError::UpdateDeclined {
            version: "2.0.0".into(),
            manual_url: "https://example.invalid/releases".into(),
        };
        assert_eq!(declined.exit_code(), 2);
        assert_eq!(KeepsakeError::Io("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: KeepsakeError = io_err.into();
        assert!(matches!(err, KeepsakeError::Io(_)));
    }
}
