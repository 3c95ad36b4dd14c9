//! Update manager for Keepsake
//!
//! Owns the update state machine and drives check, download and install.
//! The forced update policy lives in [`UpdateManager::run_forced_update`].

use std::ops::ControlFlow;
use std::path::PathBuf;

use super::checker::{CheckResult, UpdateStatus};
use super::install::{InstallResult, ReplaceHelper, ScriptReplaceHelper};
use super::release::ReleaseInfo;
use super::state::UpdateState;
use super::transport::{ReleaseTransport, UreqTransport};
use crate::backup::BackupManager;
use crate::config::paths::KeepsakePaths;
use crate::config::update::UpdateConfig;
use crate::error::{KeepsakeError, KeepsakeResult};
use crate::registry::UnavailableRegistry;

/// What a forced update run ended with
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// Nothing to install
    UpToDate(CheckResult),
    /// The helper is running; the process should exit with status 0
    Installed(InstallResult),
}

/// Drives the self-update flow
pub struct UpdateManager {
    pub(super) config: UpdateConfig,
    pub(super) paths: KeepsakePaths,
    pub(super) backups: BackupManager,
    pub(super) transport: Box<dyn ReleaseTransport>,
    pub(super) helper: Box<dyn ReplaceHelper>,
    pub(super) state: UpdateState,
    /// Last successful check of this process, or the persisted one it reused
    pub(super) last_check: Option<CheckResult>,
    pub(super) relaunch_args: Vec<String>,
    current_exe: Option<PathBuf>,
}

impl UpdateManager {
    pub fn new(
        config: UpdateConfig,
        paths: KeepsakePaths,
        backups: BackupManager,
        transport: Box<dyn ReleaseTransport>,
        helper: Box<dyn ReplaceHelper>,
    ) -> Self {
        Self {
            config,
            paths,
            backups,
            transport,
            helper,
            state: UpdateState::Idle,
            last_check: None,
            relaunch_args: std::env::args().skip(1).collect(),
            current_exe: None,
        }
    }

    /// Manager wired to HTTPS, the script helper and the backup root
    ///
    /// Executable snapshots only capture files, so no registry is attached.
    pub fn with_defaults(config: UpdateConfig, paths: KeepsakePaths) -> Self {
        let transport = UreqTransport::new(config.user_agent());
        let helper = ScriptReplaceHelper::new(paths.update_temp_dir());
        let backups = BackupManager::new(&paths, Box::new(UnavailableRegistry));
        Self::new(config, paths, backups, Box::new(transport), Box::new(helper))
    }

    /// Replace the executable path (defaults to the running binary)
    pub fn with_current_exe(mut self, path: PathBuf) -> Self {
        self.current_exe = Some(path);
        self
    }

    /// Arguments passed to the relaunched binary (defaults to this process's)
    pub fn with_relaunch_args(mut self, args: Vec<String>) -> Self {
        self.relaunch_args = args;
        self
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Last successful check, possibly loaded from the update state file
    pub fn last_check(&self) -> Option<&CheckResult> {
        self.last_check.as_ref()
    }

    pub(super) fn current_exe(&self) -> KeepsakeResult<PathBuf> {
        match &self.current_exe {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe().map_err(|e| {
                KeepsakeError::Install(format!("could not locate the running executable: {}", e))
            }),
        }
    }

    /// Check, then download and install any newer release
    ///
    /// `confirm` is asked once when an update is available. Declining is
    /// final: the flow moves to `Declined` and returns `UpdateDeclined`, which
    /// callers treat as fatal.
    pub fn run_forced_update<C, P>(
        &mut self,
        force_check: bool,
        confirm: C,
        progress: P,
    ) -> KeepsakeResult<UpdateOutcome>
    where
        C: FnOnce(&ReleaseInfo) -> bool,
        P: FnMut(u64, Option<u64>) -> ControlFlow<()>,
    {
        let check = self.check_for_updates(force_check)?;
        let release = match &check.status {
            UpdateStatus::UpToDate { .. } => return Ok(UpdateOutcome::UpToDate(check)),
            UpdateStatus::UpdateAvailable(release) => release.clone(),
        };

        if !confirm(&release) {
            self.state.advance(UpdateState::Declined)?;
            tracing::warn!("Required update to {} was declined", release.version);
            return Err(KeepsakeError::UpdateDeclined {
                version: release.version.to_string(),
                manual_url: self.config.manual_url(),
            });
        }

        let artifact = self.download_update(&release, progress)?;
        let installed = self.install_update(&artifact, &release)?;
        Ok(UpdateOutcome::Installed(installed))
    }

    #[cfg(test)]
    pub(crate) fn set_state_for_test(&mut self, state: UpdateState) {
        self.state = state;
    }
}
