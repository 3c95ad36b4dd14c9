//! Snapshot pruning
//!
//! Only snapshots whose metadata could be read are candidates; malformed
//! records are left alone.

use std::collections::BTreeMap;
use std::fs;

use chrono::{DateTime, Duration, Utc};

use super::manager::BackupManager;
use super::snapshot::Snapshot;
use crate::config::settings::BackupRetention;
use crate::error::KeepsakeResult;

/// Which snapshots to delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePolicy {
    /// Delete snapshots older than this
    pub max_age: Option<Duration>,
    /// Keep only the newest N snapshots of each scope
    pub keep_last: Option<usize>,
    /// Restrict pruning to one scope
    pub scope: Option<String>,
}

impl PrunePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn keep_last(mut self, count: usize) -> Self {
        self.keep_last = Some(count);
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Policy from the retention settings; a zero value disables that rule
    pub fn from_retention(retention: &BackupRetention) -> Self {
        Self {
            max_age: (retention.max_age_days > 0)
                .then(|| Duration::days(i64::from(retention.max_age_days))),
            keep_last: (retention.keep_per_scope > 0).then_some(retention.keep_per_scope as usize),
            scope: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.max_age.is_none() && self.keep_last.is_none()
    }
}

/// A snapshot prune could not delete
#[derive(Debug, Clone)]
pub struct PruneFailure {
    pub id: String,
    pub reason: String,
}

/// Outcome of a prune run
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    /// Ids of deleted snapshots
    pub removed: Vec<String>,
    /// Snapshots selected for deletion that could not be removed
    pub failures: Vec<PruneFailure>,
    /// Number of snapshots left in place
    pub kept: usize,
}

/// Snapshots a prune would delete, computed without deleting anything
#[derive(Debug, Clone, Default)]
pub struct PrunePlan {
    /// Newest first within each scope
    pub remove: Vec<Snapshot>,
    pub kept: usize,
}

impl BackupManager {
    /// Work out which snapshots `policy` selects at `now`
    pub fn plan_prune(&self, policy: &PrunePolicy, now: DateTime<Utc>) -> KeepsakeResult<PrunePlan> {
        let listing = self.list_snapshots(policy.scope.as_deref())?;
        let mut plan = PrunePlan::default();

        if policy.is_empty() {
            plan.kept = listing.len();
            return Ok(plan);
        }

        // Listing is newest first, so grouping keeps that order per scope
        let mut by_scope: BTreeMap<&str, Vec<&Snapshot>> = BTreeMap::new();
        for snapshot in &listing {
            by_scope.entry(snapshot.scope.as_str()).or_default().push(snapshot);
        }

        for snapshots in by_scope.values() {
            for (position, snapshot) in snapshots.iter().enumerate() {
                let over_count = policy.keep_last.map_or(false, |n| position >= n);
                let too_old = policy
                    .max_age
                    .map_or(false, |age| now.signed_duration_since(snapshot.created_at) > age);

                if over_count || too_old {
                    plan.remove.push((*snapshot).clone());
                } else {
                    plan.kept += 1;
                }
            }
        }

        Ok(plan)
    }

    /// Delete snapshots selected by `policy`
    pub fn prune_snapshots(&self, policy: &PrunePolicy) -> KeepsakeResult<PruneReport> {
        self.prune_snapshots_at(policy, Utc::now())
    }

    /// Same as [`prune_snapshots`](Self::prune_snapshots) with an explicit clock
    pub fn prune_snapshots_at(
        &self,
        policy: &PrunePolicy,
        now: DateTime<Utc>,
    ) -> KeepsakeResult<PruneReport> {
        let plan = self.plan_prune(policy, now)?;
        let mut report = PruneReport {
            kept: plan.kept,
            ..PruneReport::default()
        };

        for snapshot in plan.remove {
            match fs::remove_dir_all(&snapshot.location) {
                Ok(()) => {
                    tracing::debug!("Pruned snapshot {}", snapshot.id);
                    report.removed.push(snapshot.id);
                }
                Err(e) => {
                    tracing::warn!("Failed to prune snapshot {}: {}", snapshot.id, e);
                    report.failures.push(PruneFailure {
                        id: snapshot.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !report.removed.is_empty() {
            tracing::info!(
                removed = report.removed.len(),
                kept = report.kept,
                "Pruned snapshots"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::SnapshotTarget;
    use crate::backup::snapshot::METADATA_FILE;
    use crate::config::paths::KeepsakePaths;
    use crate::registry::MemoryRegistry;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_test_manager() -> (BackupManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = KeepsakePaths::with_base_dir(temp_dir.path().join("data"));
        paths.ensure_directories().unwrap();
        let manager = BackupManager::new(&paths, Box::new(MemoryRegistry::new()));
        (manager, temp_dir)
    }

    fn snapshot_with_blob(manager: &BackupManager, dir: &Path, scope: &str, n: usize) -> String {
        let file = dir.join(format!("{}_{}.json", scope, n));
        fs::write(&file, format!("{{\"n\": {}}}", n)).unwrap();
        let snapshot = manager
            .create_snapshot(scope, &[SnapshotTarget::file(&file)], &format!("#{}", n))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        snapshot.id
    }

    /// Rewrite a snapshot's creation time
    fn backdate(manager: &BackupManager, id: &str, created_at: DateTime<Utc>) {
        let mut snapshot = manager.find_snapshot(id).unwrap();
        snapshot.created_at = created_at;
        let json = serde_json::to_string_pretty(&snapshot).unwrap();
        fs::write(snapshot.metadata_path(), json).unwrap();
    }

    #[test]
    fn test_keep_last_per_scope_removes_blobs() {
        let (manager, temp) = create_test_manager();
        let settings: Vec<_> = (0..5)
            .map(|n| snapshot_with_blob(&manager, temp.path(), "settings", n))
            .collect();
        let network: Vec<_> = (0..2)
            .map(|n| snapshot_with_blob(&manager, temp.path(), "network", n))
            .collect();

        let report = manager
            .prune_snapshots(&PrunePolicy::new().keep_last(2))
            .unwrap();

        assert_eq!(report.removed.len(), 3);
        assert!(report.failures.is_empty());
        assert_eq!(report.kept, 4);

        let remaining = manager.list_snapshots(Some("settings")).unwrap();
        let ids: Vec<_> = remaining.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![settings[4].clone(), settings[3].clone()]);
        assert_eq!(manager.list_snapshots(Some("network")).unwrap().len(), 2);

        // Whole directories are gone, blobs included
        for id in &settings[..3] {
            assert!(!manager.backup_dir().join("settings").join(id).exists());
        }
        let scope_dir = manager.backup_dir().join("settings");
        assert_eq!(fs::read_dir(scope_dir).unwrap().count(), 2);
        assert!(network.iter().all(|id| manager.find_snapshot(id).is_ok()));
    }

    #[test]
    fn test_max_age() {
        let (manager, temp) = create_test_manager();
        let old = snapshot_with_blob(&manager, temp.path(), "updates", 0);
        let fresh = snapshot_with_blob(&manager, temp.path(), "updates", 1);

        let now = Utc::now();
        backdate(&manager, &old, now - Duration::days(31));

        let report = manager
            .prune_snapshots_at(&PrunePolicy::new().max_age(Duration::days(30)), now)
            .unwrap();

        assert_eq!(report.removed, vec![old]);
        assert_eq!(report.kept, 1);
        assert!(manager.find_snapshot(&fresh).is_ok());
    }

    #[test]
    fn test_scope_filter() {
        let (manager, temp) = create_test_manager();
        for n in 0..3 {
            snapshot_with_blob(&manager, temp.path(), "settings", n);
            snapshot_with_blob(&manager, temp.path(), "updates", n);
        }

        let report = manager
            .prune_snapshots(&PrunePolicy::new().keep_last(1).scope("updates"))
            .unwrap();

        assert_eq!(report.removed.len(), 2);
        assert_eq!(manager.list_snapshots(Some("settings")).unwrap().len(), 3);
        assert_eq!(manager.list_snapshots(Some("updates")).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_records_are_never_pruned() {
        let (manager, temp) = create_test_manager();
        snapshot_with_blob(&manager, temp.path(), "settings", 0);

        let bad_dir = manager.backup_dir().join("settings").join("settings_backup_bad");
        fs::create_dir_all(&bad_dir).unwrap();
        fs::write(bad_dir.join(METADATA_FILE), "garbage").unwrap();

        let report = manager
            .prune_snapshots(&PrunePolicy::new().keep_last(0).max_age(Duration::zero()))
            .unwrap();

        assert_eq!(report.removed.len(), 1);
        assert!(bad_dir.join(METADATA_FILE).exists());
    }

    #[test]
    fn test_plan_does_not_delete() {
        let (manager, temp) = create_test_manager();
        for n in 0..3 {
            snapshot_with_blob(&manager, temp.path(), "settings", n);
        }

        let plan = manager
            .plan_prune(&PrunePolicy::new().keep_last(1), Utc::now())
            .unwrap();

        assert_eq!(plan.remove.len(), 2);
        assert_eq!(plan.kept, 1);
        assert_eq!(plan.remove[0].description, "#1");
        assert_eq!(manager.list_snapshots(None).unwrap().len(), 3);
    }

    #[test]
    fn test_empty_policy_removes_nothing() {
        let (manager, temp) = create_test_manager();
        snapshot_with_blob(&manager, temp.path(), "settings", 0);

        let report = manager.prune_snapshots(&PrunePolicy::new()).unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(report.kept, 1);
    }

    #[test]
    fn test_policy_from_retention() {
        let policy = PrunePolicy::from_retention(&BackupRetention {
            keep_per_scope: 5,
            max_age_days: 0,
        });
        assert_eq!(policy.keep_last, Some(5));
        assert_eq!(policy.max_age, None);

        let policy = PrunePolicy::from_retention(&BackupRetention::default());
        assert_eq!(policy.keep_last, Some(20));
        assert_eq!(policy.max_age, Some(Duration::days(30)));
    }
}
