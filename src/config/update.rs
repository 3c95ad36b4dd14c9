//! Immutable update configuration
//!
//! The release endpoint is a compile-time constant. `UpdateConfig` exposes it
//! through a getter only; settings files and environment variables cannot
//! redirect update checks to another feed.

use std::time::Duration;

use super::settings::UpdateSettings;
use crate::error::KeepsakeResult;
use crate::update::version::Version;

/// Application name used in asset matching and the User-Agent header
pub const APP_NAME: &str = "keepsake";

/// Project page that hosts releases
pub const REPOSITORY_URL: &str = "https://github.com/keepsake-tools/keepsake";

/// Latest-release descriptor of the project
pub const RELEASE_ENDPOINT: &str =
    "https://api.github.com/repos/keepsake-tools/keepsake/releases/latest";

/// Settings consumed by the update checker, downloader and installer
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    current_version: Version,
    check_timeout: Duration,
    download_timeout: Duration,
    cooldown: Duration,
}

impl UpdateConfig {
    /// Build the configuration for the running binary
    pub fn from_settings(settings: &UpdateSettings) -> KeepsakeResult<Self> {
        Ok(Self::new(Version::current()?, settings))
    }

    /// Build a configuration for an explicit running version
    pub fn new(current_version: Version, settings: &UpdateSettings) -> Self {
        Self {
            current_version,
            check_timeout: Duration::from_secs(settings.check_timeout_secs),
            download_timeout: Duration::from_secs(settings.download_timeout_secs),
            cooldown: Duration::from_secs(u64::from(settings.cooldown_minutes) * 60),
        }
    }

    pub fn endpoint(&self) -> &'static str {
        RELEASE_ENDPOINT
    }

    /// Page users can visit when automatic checks fail
    pub fn manual_url(&self) -> String {
        format!("{}/releases", REPOSITORY_URL)
    }

    pub fn user_agent(&self) -> String {
        format!("{}/{}", APP_NAME, self.current_version)
    }

    pub fn current_version(&self) -> Version {
        self.current_version
    }

    pub fn check_timeout(&self) -> Duration {
        self.check_timeout
    }

    pub fn download_timeout(&self) -> Duration {
        self.download_timeout
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
