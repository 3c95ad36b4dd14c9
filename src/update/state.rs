//! Update flow state machine

use std::fmt;

use crate::error::{KeepsakeError, KeepsakeResult};

/// Where the update flow currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateState {
    #[default]
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable,
    CheckFailed,
    Downloading,
    ReadyToInstall,
    DownloadFailed,
    Installing,
    Restarting,
    InstallFailed,
    Declined,
}

impl UpdateState {
    /// Check whether the flow may move from `self` to `next`
    pub fn can_transition_to(self, next: UpdateState) -> bool {
        use UpdateState::*;

        matches!(
            (self, next),
            (Idle | UpToDate | CheckFailed | UpdateAvailable | DownloadFailed, Checking)
                | (Checking, UpToDate | UpdateAvailable | CheckFailed)
                | (UpdateAvailable | DownloadFailed, Downloading)
                | (UpdateAvailable, Declined)
                | (Downloading, ReadyToInstall | DownloadFailed)
                | (ReadyToInstall | InstallFailed, Installing)
                | (Installing, Restarting | InstallFailed)
        )
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, UpdateState::Restarting | UpdateState::Declined)
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: UpdateState) -> KeepsakeResult<()> {
        if !self.can_transition_to(next) {
            return Err(KeepsakeError::InvalidState {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!("Update state: {} -> {}", self, next);
        *self = next;
        Ok(())
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::UpToDate => "up to date",
            UpdateState::UpdateAvailable => "update available",
            UpdateState::CheckFailed => "check failed",
            UpdateState::Downloading => "downloading",
            UpdateState::ReadyToInstall => "ready to install",
            UpdateState::DownloadFailed => "download failed",
            UpdateState::Installing => "installing",
            UpdateState::Restarting => "restarting",
            UpdateState::InstallFailed => "install failed",
            UpdateState::Declined => "declined",
        };
        f.write_str(name)
    }
}
