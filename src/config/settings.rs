//! User settings for Keepsake
//!
//! Manages snapshot retention and update check preferences. Settings never
//! carry the release endpoint; see [`crate::config::update`].

use serde::{Deserialize, Serialize};

use super::paths::KeepsakePaths;
use crate::error::KeepsakeError;

/// Snapshot retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRetention {
    /// Number of snapshots to keep per scope
    #[serde(default = "default_keep_per_scope")]
    pub keep_per_scope: u32,
    /// Snapshots older than this many days are pruned
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

fn default_keep_per_scope() -> u32 {
    20
}

fn default_max_age_days() -> u32 {
    30
}

impl Default for BackupRetention {
    fn default() -> Self {
        Self {
            keep_per_scope: default_keep_per_scope(),
            max_age_days: default_max_age_days(),
        }
    }
}

/// Update check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// Check for updates before running any command
    #[serde(default = "default_true")]
    pub check_on_startup: bool,

    /// Minutes during which a repeated, non-forced check reuses the last result
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,

    /// Timeout for the release feed request
    #[serde(default = "default_check_timeout_secs")]
    pub check_timeout_secs: u64,

    /// Timeout for downloading the release asset
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_cooldown_minutes() -> u32 {
    10
}

fn default_check_timeout_secs() -> u64 {
    10
}

fn default_download_timeout_secs() -> u64 {
    300
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            check_on_startup: default_true(),
            cooldown_minutes: default_cooldown_minutes(),
            check_timeout_secs: default_check_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

/// User settings for Keepsake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Snapshot retention policy
    #[serde(default)]
    pub backup_retention: BackupRetention,

    /// Update check preferences
    #[serde(default)]
    pub update: UpdateSettings,
}

fn default_schema_version() -> u32 {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            backup_retention: BackupRetention::default(),
            update: UpdateSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or use defaults if the file doesn't exist
    pub fn load_or_create(paths: &KeepsakePaths) -> Result<Self, KeepsakeError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path).map_err(|e| {
                KeepsakeError::Io(format!("Failed to read settings file: {}", e))
            })?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                KeepsakeError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &KeepsakePaths) -> Result<(), KeepsakeError> {
        crate::storage::file_io::write_json_atomic(paths.settings_file(), self)
    }
}
