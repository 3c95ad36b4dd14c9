//! Backup manager for Keepsake
//!
//! Creates, lists and verifies snapshots. Each snapshot is a directory
//! `<backup_root>/<scope>/<id>/` holding `snapshot.json` and one blob per
//! captured file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::snapshot::{
    FileEntry, RegistryEntry, Snapshot, SnapshotTarget, METADATA_FILE, SCHEMA_VERSION,
};
use crate::config::paths::KeepsakePaths;
use crate::error::{KeepsakeError, KeepsakeResult};
use crate::registry::RegistryStore;
use crate::storage::file_io::{copy_file_synced, read_json_required, write_json_atomic};

/// A metadata record that could not be read during listing
#[derive(Debug, Clone)]
pub struct ListingWarning {
    pub path: PathBuf,
    pub reason: String,
}

/// Snapshots found by [`BackupManager::list_snapshots`], newest first
///
/// The listing is fully materialized, so it can be iterated any number of
/// times with the same result.
#[derive(Debug, Clone, Default)]
pub struct SnapshotListing {
    pub snapshots: Vec<Snapshot>,
    pub warnings: Vec<ListingWarning>,
}

impl SnapshotListing {
    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.first()
    }
}

impl<'a> IntoIterator for &'a SnapshotListing {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}

/// Creates and manages snapshots under one backup root
pub struct BackupManager {
    /// Root of all snapshot scopes
    backup_dir: PathBuf,
    /// Where registry targets are read from and restored to
    pub(super) registry: Box<dyn RegistryStore>,
}

impl BackupManager {
    /// Create a BackupManager using the configured backup directory
    pub fn new(paths: &KeepsakePaths, registry: Box<dyn RegistryStore>) -> Self {
        Self::with_root(paths.backup_dir(), registry)
    }

    /// Create a BackupManager for an explicit backup root
    pub fn with_root(backup_dir: PathBuf, registry: Box<dyn RegistryStore>) -> Self {
        Self {
            backup_dir,
            registry,
        }
    }

    /// Get backup directory path
    pub fn backup_dir(&self) -> &PathBuf {
        &self.backup_dir
    }

    /// Capture `targets` under `scope`
    ///
    /// All-or-nothing: if any file copy or registry read fails, the partial
    /// snapshot directory is removed and the failing target is reported.
    pub fn create_snapshot(
        &self,
        scope: &str,
        targets: &[SnapshotTarget],
        description: &str,
    ) -> KeepsakeResult<Snapshot> {
        validate_scope(scope)?;

        let scope_dir = self.backup_dir.join(scope);
        fs::create_dir_all(&scope_dir).map_err(|e| {
            KeepsakeError::snapshot(
                format!("scope {}", scope),
                format!("failed to create backup directory: {}", e),
            )
        })?;

        let now = Utc::now();
        let (id, location) = allocate_snapshot_dir(&scope_dir, scope, now)?;

        match self.capture(&id, scope, now, description, &location, targets) {
            Ok(snapshot) => {
                tracing::info!(
                    snapshot = %snapshot.id,
                    files = snapshot.file_count,
                    registry_values = snapshot.registry_entries.len(),
                    "Snapshot created"
                );
                Ok(snapshot)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&location) {
                    tracing::warn!(
                        "Failed to remove incomplete snapshot {}: {}",
                        location.display(),
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }

    fn capture(
        &self,
        id: &str,
        scope: &str,
        created_at: DateTime<Utc>,
        description: &str,
        location: &Path,
        targets: &[SnapshotTarget],
    ) -> KeepsakeResult<Snapshot> {
        let mut files = Vec::new();
        let mut registry_entries = Vec::new();

        for (index, target) in targets.iter().enumerate() {
            match target {
                SnapshotTarget::File(path) => {
                    if !path.is_file() {
                        return Err(KeepsakeError::snapshot(target, "not a regular file"));
                    }
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| "file".to_string());
                    let stored_path = format!("{}_{}", index, file_name);

                    copy_file_synced(path, &location.join(&stored_path))
                        .map_err(|e| KeepsakeError::snapshot(target, e))?;

                    files.push(FileEntry {
                        original_path: absolute(path),
                        stored_path,
                    });
                }
                SnapshotTarget::RegistryValue {
                    key_path,
                    value_name,
                } => {
                    let value = self
                        .registry
                        .read_value(key_path, value_name)
                        .map_err(|e| KeepsakeError::snapshot(target, e))?;

                    registry_entries.push(RegistryEntry {
                        key_path: key_path.clone(),
                        value_name: value_name.clone(),
                        value,
                    });
                }
            }
        }

        let snapshot = Snapshot {
            schema_version: SCHEMA_VERSION,
            id: id.to_string(),
            scope: scope.to_string(),
            created_at,
            description: description.to_string(),
            file_count: files.len(),
            files,
            registry_entries,
            location: location.to_path_buf(),
        };

        // Metadata goes last so a record never references a blob that was not written
        write_json_atomic(snapshot.metadata_path(), &snapshot)
            .map_err(|e| KeepsakeError::snapshot(format!("metadata for {}", id), e))?;

        Ok(snapshot)
    }

    /// List snapshots of one scope (or every scope), newest first
    ///
    /// Unreadable metadata records are reported as warnings and skipped.
    pub fn list_snapshots(&self, scope: Option<&str>) -> KeepsakeResult<SnapshotListing> {
        let mut listing = SnapshotListing::default();

        let scope_dirs = match scope {
            Some(scope) => {
                validate_scope(scope)?;
                vec![self.backup_dir.join(scope)]
            }
            None => subdirectories(&self.backup_dir)?,
        };

        for scope_dir in scope_dirs {
            for snapshot_dir in subdirectories(&scope_dir)? {
                match load_snapshot(&snapshot_dir) {
                    Ok(snapshot) => listing.snapshots.push(snapshot),
                    Err(reason) => {
                        tracing::warn!(
                            "Skipping snapshot at {}: {}",
                            snapshot_dir.display(),
                            reason
                        );
                        listing.warnings.push(ListingWarning {
                            path: snapshot_dir,
                            reason,
                        });
                    }
                }
            }
        }

        // Sort by date, newest first; ids break ties deterministically
        listing.snapshots.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(listing)
    }

    /// Resolve an id to its metadata record
    pub fn find_snapshot(&self, id: &str) -> KeepsakeResult<Snapshot> {
        let scope = scope_of_id(id).ok_or_else(|| KeepsakeError::SnapshotNotFound(id.into()))?;
        let location = self.backup_dir.join(scope).join(id);

        if !location.join(METADATA_FILE).is_file() {
            return Err(KeepsakeError::SnapshotNotFound(id.to_string()));
        }

        load_snapshot(&location).map_err(|reason| {
            KeepsakeError::Json(format!("Snapshot {} has unreadable metadata: {}", id, reason))
        })
    }

    /// Resolve an id and check that every referenced blob exists
    pub fn verify_snapshot(&self, id: &str) -> KeepsakeResult<Snapshot> {
        let snapshot = self.find_snapshot(id)?;
        let missing = snapshot.missing_blobs();
        if !missing.is_empty() {
            return Err(KeepsakeError::SnapshotCorrupt {
                id: snapshot.id,
                missing,
            });
        }
        Ok(snapshot)
    }

    /// Get the most recent snapshot of a scope
    pub fn latest_snapshot(&self, scope: Option<&str>) -> KeepsakeResult<Option<Snapshot>> {
        Ok(self.list_snapshots(scope)?.snapshots.into_iter().next())
    }
}

/// Scopes become directory names and id prefixes
fn validate_scope(scope: &str) -> KeepsakeResult<()> {
    let valid = !scope.is_empty()
        && scope
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(KeepsakeError::snapshot(
            format!("scope '{}'", scope),
            "scope names may only contain letters, digits, '_' and '-'",
        ))
    }
}

/// `<scope>_backup_<timestamp>` -> `<scope>`, rejecting anything path-like
fn scope_of_id(id: &str) -> Option<&str> {
    if id.is_empty() || id.contains(&['/', '\\'][..]) || id.contains("..") {
        return None;
    }
    let (scope, _) = id.rsplit_once("_backup_")?;
    validate_scope(scope).ok()?;
    Some(scope)
}

/// Create a fresh snapshot directory named after a microsecond timestamp
fn allocate_snapshot_dir(
    scope_dir: &Path,
    scope: &str,
    now: DateTime<Utc>,
) -> KeepsakeResult<(String, PathBuf)> {
    let base = format!("{}_backup_{}", scope, now.format("%Y%m%d_%H%M%S_%6f"));

    for attempt in 0..1000u32 {
        let id = if attempt == 0 {
            base.clone()
        } else {
            format!("{}-{}", base, attempt)
        };
        let location = scope_dir.join(&id);
        match fs::create_dir(&location) {
            Ok(()) => return Ok((id, location)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(KeepsakeError::snapshot(
                    format!("scope {}", scope),
                    format!("failed to create {}: {}", location.display(), e),
                ))
            }
        }
    }

    Err(KeepsakeError::snapshot(
        format!("scope {}", scope),
        "could not allocate a unique snapshot id",
    ))
}

fn load_snapshot(dir: &Path) -> Result<Snapshot, String> {
    let metadata_path = dir.join(METADATA_FILE);
    if !metadata_path.is_file() {
        return Err(format!("missing {}", METADATA_FILE));
    }

    let mut snapshot: Snapshot = read_json_required(&metadata_path).map_err(|e| e.to_string())?;

    let dir_name = dir.file_name().map(|n| n.to_string_lossy().to_string());
    if dir_name.as_deref() != Some(snapshot.id.as_str()) {
        return Err(format!(
            "metadata id '{}' does not match its directory",
            snapshot.id
        ));
    }

    snapshot.location = dir.to_path_buf();
    Ok(snapshot)
}

fn subdirectories(dir: &Path) -> KeepsakeResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| {
        KeepsakeError::Io(format!("Failed to read backup directory {}: {}", dir.display(), e))
    })? {
        let entry = entry
            .map_err(|e| KeepsakeError::Io(format!("Failed to read directory entry: {}", e)))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryRegistry, RegistryValue};
    use tempfile::TempDir;

    fn create_test_manager() -> (BackupManager, MemoryRegistry, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = KeepsakePaths::with_base_dir(temp_dir.path().to_path_buf());
        paths.ensure_directories().unwrap();

        let registry = MemoryRegistry::new();
        let manager = BackupManager::new(&paths, Box::new(registry.clone()));
        (manager, registry, temp_dir)
    }

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_create_snapshot_with_files_and_registry() {
        let (manager, registry, temp) = create_test_manager();
        let file = write_file(temp.path(), "storage.json", br#"{"a":1}"#);
        registry.insert(r"HKCU\Software\Editor", "Id", RegistryValue::String("abc".into()));

        let snapshot = manager
            .create_snapshot(
                "settings",
                &[
                    SnapshotTarget::file(&file),
                    SnapshotTarget::registry(r"HKCU\Software\Editor", "Id"),
                ],
                "before change",
            )
            .unwrap();

        assert!(snapshot.id.starts_with("settings_backup_"));
        assert_eq!(snapshot.file_count, 1);
        assert_eq!(snapshot.registry_entries.len(), 1);
        assert_eq!(snapshot.files[0].stored_path, "0_storage.json");
        assert!(snapshot.metadata_path().is_file());
        assert_eq!(
            fs::read(snapshot.stored_file_path(&snapshot.files[0])).unwrap(),
            br#"{"a":1}"#
        );
        assert_eq!(snapshot.location.parent().unwrap(), manager.backup_dir().join("settings"));
    }

    #[test]
    fn test_create_snapshot_does_not_touch_targets() {
        let (manager, registry, temp) = create_test_manager();
        let file = write_file(temp.path(), "db.sqlite", b"\x00\x01binary");
        registry.insert(r"HKLM\Software\X", "V", RegistryValue::Dword(9));

        manager
            .create_snapshot(
                "db",
                &[SnapshotTarget::file(&file), SnapshotTarget::registry(r"HKLM\Software\X", "V")],
                "",
            )
            .unwrap();

        assert_eq!(fs::read(&file).unwrap(), b"\x00\x01binary");
        assert_eq!(registry.get(r"HKLM\Software\X", "V"), Some(RegistryValue::Dword(9)));
    }

    #[test]
    fn test_create_snapshot_is_all_or_nothing() {
        let (manager, _registry, temp) = create_test_manager();
        let file = write_file(temp.path(), "a.json", b"{}");

        let err = manager
            .create_snapshot(
                "settings",
                &[
                    SnapshotTarget::file(&file),
                    SnapshotTarget::registry(r"HKCU\Software\Missing", "Nope"),
                ],
                "",
            )
            .unwrap_err();

        match err {
            KeepsakeError::Snapshot { target, .. } => {
                assert!(target.contains(r"HKCU\Software\Missing\Nope"))
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let scope_dir = manager.backup_dir().join("settings");
        assert_eq!(fs::read_dir(&scope_dir).unwrap().count(), 0);
        assert!(manager.list_snapshots(Some("settings")).unwrap().is_empty());
    }

    #[test]
    fn test_create_snapshot_rejects_missing_file() {
        let (manager, _registry, temp) = create_test_manager();
        let err = manager
            .create_snapshot("settings", &[SnapshotTarget::file(temp.path().join("nope"))], "")
            .unwrap_err();
        assert!(matches!(err, KeepsakeError::Snapshot { .. }));
    }

    #[test]
    fn test_invalid_scope_is_rejected() {
        let (manager, _registry, _temp) = create_test_manager();
        for scope in ["", "../x", "a/b", "with space"] {
            assert!(manager.create_snapshot(scope, &[], "").is_err(), "{scope:?}");
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let (manager, _registry, _temp) = create_test_manager();
        let mut ids = std::collections::HashSet::new();
        for _ in 0..10 {
            let snapshot = manager.create_snapshot("rapid", &[], "").unwrap();
            assert!(ids.insert(snapshot.id));
        }
    }

    #[test]
    fn test_allocate_snapshot_dir_on_collision() {
        let temp = TempDir::new().unwrap();
        let now = Utc::now();
        let (first, _) = allocate_snapshot_dir(temp.path(), "s", now).unwrap();
        let (second, _) = allocate_snapshot_dir(temp.path(), "s", now).unwrap();
        assert_ne!(first, second);
        assert_eq!(second, format!("{}-1", first));
    }

    #[test]
    fn test_list_snapshots_newest_first_and_idempotent() {
        let (manager, _registry, _temp) = create_test_manager();

        manager.create_snapshot("settings", &[], "one").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        manager.create_snapshot("network", &[], "two").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        manager.create_snapshot("settings", &[], "three").unwrap();

        let all = manager.list_snapshots(None).unwrap();
        let descriptions: Vec<_> = all.iter().map(|s| s.description.as_str()).collect();
        assert_eq!(descriptions, vec!["three", "two", "one"]);

        let again = manager.list_snapshots(None).unwrap();
        assert_eq!(all.snapshots, again.snapshots);

        let scoped = manager.list_snapshots(Some("settings")).unwrap();
        assert_eq!(scoped.len(), 2);
        assert!(scoped.iter().all(|s| s.scope == "settings"));
    }

    #[test]
    fn test_list_skips_malformed_metadata_with_warning() {
        let (manager, _registry, _temp) = create_test_manager();
        manager.create_snapshot("settings", &[], "good").unwrap();

        let bad_dir = manager.backup_dir().join("settings").join("settings_backup_bad");
        fs::create_dir_all(&bad_dir).unwrap();
        fs::write(bad_dir.join(METADATA_FILE), "{ not json").unwrap();

        let listing = manager.list_snapshots(Some("settings")).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.warnings.len(), 1);
        assert_eq!(listing.warnings[0].path, bad_dir);
    }

    #[test]
    fn test_empty_backup_dir() {
        let (manager, _registry, _temp) = create_test_manager();
        assert!(manager.list_snapshots(None).unwrap().is_empty());
        assert!(manager.list_snapshots(Some("never")).unwrap().is_empty());
        assert!(manager.latest_snapshot(None).unwrap().is_none());
    }

    #[test]
    fn test_find_snapshot() {
        let (manager, _registry, _temp) = create_test_manager();
        let created = manager.create_snapshot("settings", &[], "x").unwrap();

        let found = manager.find_snapshot(&created.id).unwrap();
        assert_eq!(found, created);

        for bad in ["", "nothing", "settings_backup_0", "../settings_backup_0", "a\\b_backup_1"] {
            assert!(manager.find_snapshot(bad).unwrap_err().is_not_found(), "{bad:?}");
        }
    }

    #[test]
    fn test_verify_snapshot_detects_missing_blob() {
        let (manager, _registry, temp) = create_test_manager();
        let file = write_file(temp.path(), "a.json", b"{}");
        let snapshot = manager
            .create_snapshot("settings", &[SnapshotTarget::file(&file)], "")
            .unwrap();

        assert!(manager.verify_snapshot(&snapshot.id).is_ok());

        fs::remove_file(snapshot.stored_file_path(&snapshot.files[0])).unwrap();
        let err = manager.verify_snapshot(&snapshot.id).unwrap_err();
        assert!(err.is_corrupt());
    }
}
