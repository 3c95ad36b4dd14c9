//! Self-update for Keepsake
//!
//! Checks the project's latest GitHub release, downloads a newer executable
//! and hands the swap to a helper script that runs after this process exits.
//!
//! # Flow
//!
//! ```text
//! Idle -> Checking -> UpToDate | UpdateAvailable | CheckFailed
//! UpdateAvailable -> Downloading -> ReadyToInstall | DownloadFailed
//! UpdateAvailable -> Declined
//! ReadyToInstall -> Installing -> Restarting | InstallFailed
//! ```
//!
//! Updates are mandatory: declining an available update ends the process
//! with a non-zero exit code.

mod checker;
mod download;
mod install;
mod manager;
pub mod release;
pub mod state;
#[cfg(test)]
mod testing;
pub mod transport;
pub mod version;

pub use checker::{CheckResult, LastCheckRecord, UpdateStatus, Verification};
pub use install::{
    HandoffInstruction, InstallResult, ReplaceHelper, ScriptReplaceHelper, UPDATES_SCOPE,
};
pub use manager::{UpdateManager, UpdateOutcome};
pub use release::ReleaseInfo;
pub use state::UpdateState;
pub use transport::{ReleaseTransport, TlsMode, TransportError, UreqTransport};
pub use version::Version;
