//! Path management for Keepsake
//!
//! ## Path Resolution Order
//!
//! 1. `KEEPSAKE_DATA_DIR` environment variable (if set)
//! 2. The platform configuration directory from `directories`
//!    (`%APPDATA%\keepsake` on Windows, `~/.config/keepsake` on Linux)
//!
//! Only local storage locations are resolved here. The release endpoint is
//! not a path and is deliberately absent from this module.

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::KeepsakeError;

/// Manages all paths used by Keepsake
#[derive(Debug, Clone)]
pub struct KeepsakePaths {
    /// Base directory for all Keepsake data
    base_dir: PathBuf,
}

impl KeepsakePaths {
    /// Create a new KeepsakePaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no platform configuration directory exists.
    pub fn new() -> Result<Self, KeepsakeError> {
        let base_dir = if let Ok(custom) = std::env::var("KEEPSAKE_DATA_DIR") {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create KeepsakePaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Root of all snapshot scopes
    pub fn backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Parent of the update working directories
    pub fn updates_dir(&self) -> PathBuf {
        self.base_dir.join("updates")
    }

    /// Downloads in progress and finished artifacts
    pub fn update_temp_dir(&self) -> PathBuf {
        self.updates_dir().join("temp")
    }

    /// Artifacts handed off to the replace helper
    pub fn update_staging_dir(&self) -> PathBuf {
        self.updates_dir().join("staging")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Last-checked timestamp of the update checker
    pub fn update_state_file(&self) -> PathBuf {
        self.updates_dir().join("update_state.json")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), KeepsakeError> {
        for dir in [
            self.base_dir.clone(),
            self.backup_dir(),
            self.update_temp_dir(),
            self.update_staging_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                KeepsakeError::Io(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        Ok(())
    }
}

/// Resolve the default data directory path based on platform
fn resolve_default_path() -> Result<PathBuf, KeepsakeError> {
    ProjectDirs::from("", "", "keepsake")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| KeepsakeError::Config("Could not determine configuration directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = KeepsakePaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.backup_dir(), temp_dir.path().join("backups"));
        assert_eq!(
            paths.update_temp_dir(),
            temp_dir.path().join("updates").join("temp")
        );
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = KeepsakePaths::with_base_dir(temp_dir.path().join("nested"));

        paths.ensure_directories().unwrap();

        assert!(paths.backup_dir().exists());
        assert!(paths.update_temp_dir().exists());
        assert!(paths.update_staging_dir().exists());
    }

    #[test]
    fn test_file_paths() {
        let temp_dir = TempDir::new().unwrap();
        let paths = KeepsakePaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
        assert_eq!(
            paths.update_state_file(),
            temp_dir.path().join("updates").join("update_state.json")
        );
    }
}
