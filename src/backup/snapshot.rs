//! Snapshot metadata model
//!
//! One `snapshot.json` per snapshot directory:
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "id": "settings_backup_20250101_120000_000123",
//!   "scope": "settings",
//!   "created_at": "2025-01-01T12:00:00.000123Z",
//!   "description": "Before telemetry change",
//!   "file_count": 1,
//!   "files": [{ "original_path": "C:\\...\\storage.json", "stored_path": "0_storage.json" }],
//!   "registry_entries": [{ "key_path": "HKCU\\Software\\X", "value_name": "Id",
//!                          "value_type": "REG_SZ", "value_data": "abc" }]
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EntryRef, KeepsakeError};
use crate::registry::{RegistryValue, RegistryValueType};

/// Name of the metadata record inside a snapshot directory
pub const METADATA_FILE: &str = "snapshot.json";

/// Current metadata schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Something to capture in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotTarget {
    /// A regular file, copied byte for byte
    File(PathBuf),
    /// A single registry value, captured with its type
    RegistryValue {
        key_path: String,
        value_name: String,
    },
}

impl SnapshotTarget {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn registry(key_path: impl Into<String>, value_name: impl Into<String>) -> Self {
        Self::RegistryValue {
            key_path: key_path.into(),
            value_name: value_name.into(),
        }
    }
}

impl fmt::Display for SnapshotTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotTarget::File(path) => write!(f, "file {}", path.display()),
            SnapshotTarget::RegistryValue {
                key_path,
                value_name,
            } => write!(f, "registry {}\\{}", key_path, value_name),
        }
    }
}

/// A captured file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Where the file lived when captured
    pub original_path: PathBuf,
    /// Blob name, relative to the snapshot directory
    pub stored_path: String,
}

impl FileEntry {
    pub fn entry_ref(&self) -> EntryRef {
        EntryRef::File(self.original_path.display().to_string())
    }
}

/// A captured registry value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRegistryEntry", into = "RawRegistryEntry")]
pub struct RegistryEntry {
    pub key_path: String,
    pub value_name: String,
    pub value: RegistryValue,
}

impl RegistryEntry {
    pub fn entry_ref(&self) -> EntryRef {
        EntryRef::Registry {
            key_path: self.key_path.clone(),
            value_name: self.value_name.clone(),
        }
    }
}

/// On-disk shape of [`RegistryEntry`]
#[derive(Serialize, Deserialize)]
struct RawRegistryEntry {
    key_path: String,
    value_name: String,
    value_type: RegistryValueType,
    value_data: serde_json::Value,
}

impl TryFrom<RawRegistryEntry> for RegistryEntry {
    type Error = KeepsakeError;

    fn try_from(raw: RawRegistryEntry) -> Result<Self, Self::Error> {
        let value = RegistryValue::from_json(raw.value_type, &raw.value_data)?;
        Ok(Self {
            key_path: raw.key_path,
            value_name: raw.value_name,
            value,
        })
    }
}

impl From<RegistryEntry> for RawRegistryEntry {
    fn from(entry: RegistryEntry) -> Self {
        Self {
            value_type: entry.value.value_type(),
            value_data: entry.value.data_to_json(),
            key_path: entry.key_path,
            value_name: entry.value_name,
        }
    }
}

/// A named, timestamped capture of files and registry values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub id: String,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    pub file_count: usize,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registry_entries: Vec<RegistryEntry>,
    /// Directory holding the metadata record and blobs
    #[serde(skip)]
    pub location: PathBuf,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl Snapshot {
    /// Absolute path of a file entry's blob
    pub fn stored_file_path(&self, entry: &FileEntry) -> PathBuf {
        self.location.join(&entry.stored_path)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.location.join(METADATA_FILE)
    }

    /// Blob names referenced by the metadata that are not on disk
    pub fn missing_blobs(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|entry| !blob_is_valid(&entry.stored_path, &self.stored_file_path(entry)))
            .map(|entry| entry.stored_path.clone())
            .collect()
    }

    /// Targets that would capture the same live state again
    pub fn targets(&self) -> Vec<SnapshotTarget> {
        self.files
            .iter()
            .map(|f| SnapshotTarget::File(f.original_path.clone()))
            .chain(self.registry_entries.iter().map(|r| SnapshotTarget::RegistryValue {
                key_path: r.key_path.clone(),
                value_name: r.value_name.clone(),
            }))
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.files.len() + self.registry_entries.len()
    }
}

/// Blob names are plain file names inside the snapshot directory
fn blob_is_valid(stored_path: &str, full_path: &Path) -> bool {
    let plain = Path::new(stored_path)
        .file_name()
        .map_or(false, |name| name == std::ffi::OsStr::new(stored_path));
    plain && full_path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Snapshot {
        Snapshot {
            schema_version: SCHEMA_VERSION,
            id: "settings_backup_20250101_120000_000001".into(),
            scope: "settings".into(),
            created_at: Utc::now(),
            description: "test".into(),
            file_count: 1,
            files: vec![FileEntry {
                original_path: PathBuf::from("/tmp/a.json"),
                stored_path: "0_a.json".into(),
            }],
            registry_entries: vec![RegistryEntry {
                key_path: r"HKCU\Software\X".into(),
                value_name: "Flags".into(),
                value: RegistryValue::Binary(vec![1, 2, 3]),
            }],
            location: PathBuf::new(),
        }
    }

    #[test]
    fn test_registry_entry_json_shape() {
        let json = serde_json::to_value(&sample()).unwrap();
        let entry = &json["registry_entries"][0];
        assert_eq!(entry["key_path"], r"HKCU\Software\X");
        assert_eq!(entry["value_type"], "REG_BINARY");
        assert_eq!(entry["value_data"], "AQID");
        assert!(json.get("location").is_none());
        assert_eq!(json["file_count"], 1);
    }

    #[test]
    fn test_registry_entries_optional() {
        let json = r#"{
            "id": "x_backup_1", "scope": "x", "created_at": "2025-01-01T00:00:00Z",
            "file_count": 0
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.registry_entries.is_empty());
        assert!(snapshot.files.is_empty());
        assert_eq!(snapshot.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_bad_registry_data_fails_to_parse() {
        let json = r#"{
            "id": "x_backup_1", "scope": "x", "created_at": "2025-01-01T00:00:00Z",
            "file_count": 0, "files": [],
            "registry_entries": [{"key_path": "HKCU\\S", "value_name": "V",
                                  "value_type": "REG_DWORD", "value_data": "nope"}]
        }"#;
        assert!(serde_json::from_str::<Snapshot>(json).is_err());
    }

    #[test]
    fn test_missing_blobs() {
        let temp = TempDir::new().unwrap();
        let mut snapshot = sample();
        snapshot.location = temp.path().to_path_buf();

        assert_eq!(snapshot.missing_blobs(), vec!["0_a.json".to_string()]);

        std::fs::write(temp.path().join("0_a.json"), b"{}").unwrap();
        assert!(snapshot.missing_blobs().is_empty());

        snapshot.files[0].stored_path = "../0_a.json".into();
        assert_eq!(snapshot.missing_blobs().len(), 1);
    }

    #[test]
    fn test_targets_cover_all_entries() {
        let snapshot = sample();
        let targets = snapshot.targets();
        assert_eq!(targets.len(), snapshot.entry_count());
        assert_eq!(targets[0], SnapshotTarget::file("/tmp/a.json"));
        assert_eq!(targets[1], SnapshotTarget::registry(r"HKCU\Software\X", "Flags"));
    }
}
