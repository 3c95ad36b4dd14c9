//! Snapshot backups for Keepsake
//!
//! Captures files and registry values before they are changed and puts them
//! back later.
//!
//! # Architecture
//!
//! - `BackupManager`: creates, lists, verifies, restores and prunes snapshots
//! - `Snapshot`: the metadata record written once per snapshot
//! - `RegistryStore`: where registry targets are read from and written to
//!
//! # Layout
//!
//! ```text
//! <backup root>/
//!   <scope>/
//!     <scope>_backup_<YYYYMMDD_HHMMSS_ffffff>/
//!       snapshot.json
//!       0_<file name>
//!       1_<file name>
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use keepsake::backup::{BackupManager, RestoreMode, SnapshotTarget};
//! use keepsake::config::paths::KeepsakePaths;
//! use keepsake::registry::system_registry;
//!
//! let paths = KeepsakePaths::new()?;
//! let manager = BackupManager::new(&paths, system_registry());
//!
//! let snapshot = manager.create_snapshot(
//!     "settings",
//!     &[SnapshotTarget::file("/path/to/settings.json")],
//!     "Before reset",
//! )?;
//!
//! // Later
//! let result = manager.restore_snapshot(&snapshot.id, RestoreMode::BestEffort)?;
//! println!("{}", result.summary());
//! ```

mod manager;
mod restore;
mod retention;
pub mod snapshot;

pub use manager::{BackupManager, ListingWarning, SnapshotListing};
pub use restore::{RestoreFailure, RestoreMode, RestoreResult, PRE_RESTORE_SCOPE};
pub use retention::{PruneFailure, PrunePlan, PrunePolicy, PruneReport};
pub use snapshot::{FileEntry, RegistryEntry, Snapshot, SnapshotTarget};
