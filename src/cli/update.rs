//! Update CLI commands
//!
//! `keepsake update check` reports whether a newer release exists and
//! `keepsake update apply` runs the forced update flow. The same flow runs
//! before other commands when `update.check_on_startup` is set.

use clap::Subcommand;

use super::format::{download_progress, format_size};
use super::prompt::confirm;
use crate::config::paths::KeepsakePaths;
use crate::config::settings::Settings;
use crate::config::update::UpdateConfig;
use crate::error::{KeepsakeError, KeepsakeResult};
use crate::update::{ReleaseInfo, UpdateManager, UpdateOutcome, Verification};

/// Update subcommands
#[derive(Subcommand)]
pub enum UpdateCommands {
    /// Check whether a newer release is available
    Check {
        /// Ignore the cooldown and query the release feed now
        #[arg(short, long)]
        force: bool,
    },

    /// Download and install the latest release
    Apply {
        /// Install without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// What the caller should do after the startup check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupAction {
    /// Run the requested command
    Continue,
    /// The replace helper is running; exit with status 0
    Exit,
}

/// Handle an update command
///
/// Returns `StartupAction::Exit` when a new executable was handed off.
pub fn handle_update_command(
    paths: &KeepsakePaths,
    settings: &Settings,
    cmd: UpdateCommands,
) -> KeepsakeResult<StartupAction> {
    let config = UpdateConfig::from_settings(&settings.update)?;
    let mut manager = UpdateManager::with_defaults(config, paths.clone());

    match cmd {
        UpdateCommands::Check { force } => {
            let result = manager.check_for_updates(force)?;

            println!("Current version: {}", result.current_version);
            println!("Latest version:  {}", result.latest_version());
            if result.verification == Verification::Bypassed {
                println!("Warning: the release feed was reached without certificate verification.");
            }
            println!();

            match result.release() {
                Some(release) => {
                    print_release(release);
                    println!();
                    println!("To install it, run: keepsake update apply");
                }
                None => println!("Keepsake is up to date."),
            }
            Ok(StartupAction::Continue)
        }

        UpdateCommands::Apply { yes } => {
            let outcome = manager.run_forced_update(
                true,
                |release| yes || ask_to_install(release),
                download_progress(),
            )?;
            Ok(report_outcome(&outcome))
        }
    }
}

/// Run the forced update flow before a command
///
/// Only a declined update stops the program. Every other failure is logged
/// and the command runs on the current version.
pub fn run_startup_check(
    paths: &KeepsakePaths,
    settings: &Settings,
) -> KeepsakeResult<StartupAction> {
    let config = match UpdateConfig::from_settings(&settings.update) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Skipping update check: {}", e);
            return Ok(StartupAction::Continue);
        }
    };
    let mut manager = UpdateManager::with_defaults(config, paths.clone());

    match manager.run_forced_update(false, ask_to_install, download_progress()) {
        Ok(outcome) => Ok(report_outcome(&outcome)),
        Err(e) if e.is_update_declined() => Err(e),
        Err(e @ KeepsakeError::CheckFailed { .. }) => {
            eprintln!("Warning: {}", e);
            Ok(StartupAction::Continue)
        }
        Err(e) => {
            tracing::warn!("Update failed, continuing with the current version: {}", e);
            eprintln!("Warning: {}", e);
            Ok(StartupAction::Continue)
        }
    }
}

fn ask_to_install(release: &ReleaseInfo) -> bool {
    eprintln!("A required update is available.");
    eprintln!();
    eprintln!("  {} ({})", release.name, release.version);
    if !release.published_at.is_empty() {
        eprintln!("  Published: {}", release.published_at);
    }
    eprintln!();
    eprintln!("{}", release.notes);
    eprintln!();

    match confirm(&format!("Install version {} now?", release.version)) {
        Ok(answer) => answer,
        Err(e) => {
            tracing::warn!("Could not read confirmation: {}", e);
            false
        }
    }
}

fn report_outcome(outcome: &UpdateOutcome) -> StartupAction {
    match outcome {
        UpdateOutcome::UpToDate(result) => {
            tracing::info!("Running the latest version ({})", result.current_version);
            StartupAction::Continue
        }
        UpdateOutcome::Installed(result) => {
            println!("Update to {} staged.", result.version);
            println!("Previous executable saved as snapshot {}", result.backup_id);
            println!("Keepsake will restart once this process exits.");
            StartupAction::Exit
        }
    }
}

fn print_release(release: &ReleaseInfo) {
    println!("Update available: {}", release.name);
    println!("Version: {}", release.version);
    if !release.published_at.is_empty() {
        println!("Published: {}", release.published_at);
    }
    match release.size {
        Some(size) => println!("Download: {} ({})", release.asset_name, format_size(size)),
        None => println!("Download: {}", release.asset_name),
    }
    println!();
    println!("{}", release.notes);
}
