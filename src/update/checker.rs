//! Release checks
//!
//! The first request verifies TLS certificates. A certificate failure gets
//! exactly one retry with verification relaxed, and the result says so.
//! Every other failure becomes `CheckFailed` with the manual download page.
//!
//! The last successful check is written to the update state file. Unforced
//! checks within the cooldown reuse it, across processes, instead of asking
//! the release feed again.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::manager::UpdateManager;
use super::release::{GithubRelease, ReleaseInfo};
use super::state::UpdateState;
use super::transport::{TlsMode, TransportError};
use super::version::Version;
use crate::config::update::APP_NAME;
use crate::error::{KeepsakeError, KeepsakeResult};
use crate::storage::file_io::{read_json_required, write_json_atomic};

/// How the release feed's identity was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// Certificate chain and host name were verified
    #[default]
    Verified,
    /// Certificate verification failed and was skipped on retry
    Bypassed,
}

/// Result of comparing the running version with the latest release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate { latest: Version },
    UpdateAvailable(ReleaseInfo),
}

/// Outcome of a successful check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub current_version: Version,
    pub status: UpdateStatus,
    pub verification: Verification,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn is_update_available(&self) -> bool {
        matches!(self.status, UpdateStatus::UpdateAvailable(_))
    }

    pub fn release(&self) -> Option<&ReleaseInfo> {
        match &self.status {
            UpdateStatus::UpdateAvailable(release) => Some(release),
            UpdateStatus::UpToDate { .. } => None,
        }
    }

    pub fn latest_version(&self) -> Version {
        match &self.status {
            UpdateStatus::UpdateAvailable(release) => release.version,
            UpdateStatus::UpToDate { latest } => *latest,
        }
    }
}

/// Last successful check, persisted to throttle checks across runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCheckRecord {
    pub checked_at: DateTime<Utc>,
    pub current_version: Version,
    pub latest_version: Version,
    pub verification: Verification,
    /// Release the check offered, if it found an update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseInfo>,
}

impl LastCheckRecord {
    /// Read the record, if one was written
    pub fn load(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match read_json_required(path) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Ignoring unreadable update state {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Rebuild the check this record was written from
    pub fn to_check_result(&self) -> CheckResult {
        let status = match &self.release {
            Some(release) => UpdateStatus::UpdateAvailable(release.clone()),
            None => UpdateStatus::UpToDate {
                latest: self.latest_version,
            },
        };
        CheckResult {
            current_version: self.current_version,
            status,
            verification: self.verification,
            checked_at: self.checked_at,
        }
    }
}

impl From<&CheckResult> for LastCheckRecord {
    fn from(result: &CheckResult) -> Self {
        Self {
            checked_at: result.checked_at,
            current_version: result.current_version,
            latest_version: result.latest_version(),
            verification: result.verification,
            release: result.release().cloned(),
        }
    }
}

/// A check stamped in the future means the clock moved back; it never counts
fn within_cooldown(checked_at: DateTime<Utc>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    (now - checked_at)
        .to_std()
        .map_or(false, |age| age < cooldown)
}

fn settled_state(result: &CheckResult) -> UpdateState {
    if result.is_update_available() {
        UpdateState::UpdateAvailable
    } else {
        UpdateState::UpToDate
    }
}

impl UpdateManager {
    /// Check the release feed for a newer version
    ///
    /// Unless `force` is set, a successful check made within the cooldown is
    /// returned again without touching the network. That includes a check
    /// recorded by an earlier run of the same version.
    pub fn check_for_updates(&mut self, force: bool) -> KeepsakeResult<CheckResult> {
        if !force {
            let now = Utc::now();
            if let Some(cached) = &self.last_check {
                if within_cooldown(cached.checked_at, now, self.config.cooldown()) {
                    tracing::debug!("Reusing update check from {}", cached.checked_at);
                    return Ok(cached.clone());
                }
            } else if let Some(recorded) = self.recorded_check(now) {
                tracing::debug!("Reusing recorded update check from {}", recorded.checked_at);
                self.state.advance(UpdateState::Checking)?;
                self.state.advance(settled_state(&recorded))?;
                self.last_check = Some(recorded.clone());
                return Ok(recorded);
            }
        }

        self.state.advance(UpdateState::Checking)?;

        match self.fetch_latest() {
            Ok(result) => {
                self.state.advance(settled_state(&result))?;

                tracing::info!(
                    current = %result.current_version,
                    latest = %result.latest_version(),
                    verification = ?result.verification,
                    "Update check complete"
                );

                let state_file = self.paths.update_state_file();
                if let Err(e) = write_json_atomic(&state_file, &LastCheckRecord::from(&result)) {
                    tracing::warn!("Failed to record update check: {}", e);
                }

                self.last_check = Some(result.clone());
                Ok(result)
            }
            Err(e) => {
                self.state.advance(UpdateState::CheckFailed)?;
                tracing::warn!("{}", e);
                Err(e)
            }
        }
    }

    /// Persisted check of this version that is still within the cooldown
    fn recorded_check(&self, now: DateTime<Utc>) -> Option<CheckResult> {
        let record = LastCheckRecord::load(&self.paths.update_state_file())?;
        let usable = record.current_version == self.config.current_version()
            && within_cooldown(record.checked_at, now, self.config.cooldown());
        usable.then(|| record.to_check_result())
    }

    fn fetch_latest(&self) -> KeepsakeResult<CheckResult> {
        let url = self.config.endpoint();
        let timeout = self.config.check_timeout();

        let (body, verification) = match self.transport.fetch(url, TlsMode::Strict, timeout) {
            Ok(body) => (body, Verification::Verified),
            Err(TransportError::Certificate(reason)) => {
                tracing::warn!(
                    "Certificate verification failed ({}); retrying once without verification",
                    reason
                );
                let body = self
                    .transport
                    .fetch(url, TlsMode::Relaxed, timeout)
                    .map_err(|e| self.check_failed(e))?;
                tracing::warn!("Release information was fetched without certificate verification");
                (body, Verification::Bypassed)
            }
            Err(e) => return Err(self.check_failed(e)),
        };

        let release = GithubRelease::from_slice(&body).map_err(|e| self.check_failed_with(e))?;
        let latest = release.version().map_err(|e| self.check_failed_with(e))?;
        let current = self.config.current_version();

        let status = if latest > current {
            let info = release
                .into_release_info(APP_NAME)
                .map_err(|e| self.check_failed_with(e))?;
            UpdateStatus::UpdateAvailable(info)
        } else {
            UpdateStatus::UpToDate { latest }
        };

        Ok(CheckResult {
            current_version: current,
            status,
            verification,
            checked_at: Utc::now(),
        })
    }

    fn check_failed(&self, err: TransportError) -> KeepsakeError {
        let reason = match err {
            TransportError::Status(403) => {
                "GitHub API rate limit exceeded, try again later".to_string()
            }
            TransportError::Status(code) => format!("release feed answered HTTP {}", code),
            TransportError::Certificate(reason) => {
                format!("certificate verification failed: {}", reason)
            }
            TransportError::Network(reason) => {
                format!("could not reach the release feed: {}", reason)
            }
        };
        KeepsakeError::CheckFailed {
            reason,
            manual_url: self.config.manual_url(),
        }
    }

    fn check_failed_with(&self, err: KeepsakeError) -> KeepsakeError {
        KeepsakeError::CheckFailed {
            reason: err.to_string(),
            manual_url: self.config.manual_url(),
        }
    }
}
