//! Backup-guarded self-replacement
//!
//! A running executable cannot overwrite itself on Windows. Installing
//! snapshots the current binary, stages the new one and hands both paths to a
//! [`ReplaceHelper`] that performs the swap after this process exits.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, SystemTime};

use super::manager::UpdateManager;
use super::release::ReleaseInfo;
use super::state::UpdateState;
use super::version::Version;
use crate::backup::{PrunePolicy, SnapshotTarget};
use crate::error::{KeepsakeError, KeepsakeResult};
use crate::storage::file_io::{copy_file_synced, remove_files_older_than};

/// Snapshot scope holding copies of replaced executables
pub const UPDATES_SCOPE: &str = "updates";

/// Downloads older than this are removed after an install
const TEMP_FILE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Executable snapshots older than this many days are pruned after an install
const EXECUTABLE_SNAPSHOT_MAX_AGE_DAYS: i64 = 30;

/// Everything the helper needs to finish the swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffInstruction {
    pub current_exe: PathBuf,
    pub staged_exe: PathBuf,
    pub relaunch_args: Vec<String>,
}

/// Performs the executable swap outside this process
pub trait ReplaceHelper {
    /// Start the swap; the caller exits right after this returns
    fn hand_off(&self, instruction: &HandoffInstruction) -> KeepsakeResult<()>;
}

/// Result of a completed handoff
#[derive(Debug, Clone)]
pub struct InstallResult {
    pub version: Version,
    /// Snapshot holding the replaced executable
    pub backup_id: String,
    pub current_exe: PathBuf,
    pub staged_exe: PathBuf,
    pub temp_files_removed: usize,
    pub snapshots_pruned: usize,
}

impl UpdateManager {
    /// Install a downloaded artifact
    ///
    /// On success the helper is running and the process should exit with
    /// status 0 so the swap can complete.
    pub fn install_update(
        &mut self,
        artifact: &Path,
        release: &ReleaseInfo,
    ) -> KeepsakeResult<InstallResult> {
        self.state.advance(UpdateState::Installing)?;

        match self.stage_and_hand_off(artifact, release) {
            Ok(mut result) => {
                self.state.advance(UpdateState::Restarting)?;
                tracing::info!(
                    version = %release.version,
                    backup = %result.backup_id,
                    "Update handed off"
                );
                self.cleanup_after_install(artifact, &mut result);
                Ok(result)
            }
            Err(e) => {
                self.state.advance(UpdateState::InstallFailed)?;
                tracing::warn!("{}", e);
                Err(e)
            }
        }
    }

    fn stage_and_hand_off(
        &self,
        artifact: &Path,
        release: &ReleaseInfo,
    ) -> KeepsakeResult<InstallResult> {
        if !artifact.is_file() {
            return Err(KeepsakeError::Install(format!(
                "downloaded artifact {} is missing",
                artifact.display()
            )));
        }

        let current_exe = self.current_exe()?;

        let snapshot = self
            .backups
            .create_snapshot(
                UPDATES_SCOPE,
                &[SnapshotTarget::file(&current_exe)],
                &format!(
                    "Executable {} before update to {}",
                    self.config.current_version(),
                    release.version
                ),
            )
            .map_err(|e| KeepsakeError::Install(format!("could not back up the executable: {}", e)))?;

        let file_name = artifact
            .file_name()
            .ok_or_else(|| KeepsakeError::Install(format!("invalid artifact {}", artifact.display())))?;
        let staged_exe = self.paths.update_staging_dir().join(file_name);
        copy_file_synced(artifact, &staged_exe)
            .map_err(|e| KeepsakeError::Install(format!("could not stage the update: {}", e)))?;

        let instruction = HandoffInstruction {
            current_exe: current_exe.clone(),
            staged_exe: staged_exe.clone(),
            relaunch_args: self.relaunch_args.clone(),
        };
        self.helper.hand_off(&instruction).map_err(|e| match e {
            KeepsakeError::Install(_) => e,
            other => KeepsakeError::Install(other.to_string()),
        })?;

        Ok(InstallResult {
            version: release.version,
            backup_id: snapshot.id,
            current_exe,
            staged_exe,
            temp_files_removed: 0,
            snapshots_pruned: 0,
        })
    }

    /// Best-effort cleanup of old downloads and executable snapshots
    fn cleanup_after_install(&self, artifact: &Path, result: &mut InstallResult) {
        if let Err(e) = fs::remove_file(artifact) {
            tracing::debug!("Could not remove {}: {}", artifact.display(), e);
        }

        let cutoff = SystemTime::now()
            .checked_sub(TEMP_FILE_MAX_AGE)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        match remove_files_older_than(&self.paths.update_temp_dir(), cutoff) {
            Ok(removed) => result.temp_files_removed = removed.len(),
            Err(e) => tracing::warn!("Update temp cleanup failed: {}", e),
        }

        let policy = PrunePolicy::new()
            .scope(UPDATES_SCOPE)
            .max_age(chrono::Duration::days(EXECUTABLE_SNAPSHOT_MAX_AGE_DAYS));
        match self.backups.prune_snapshots(&policy) {
            Ok(report) => result.snapshots_pruned = report.removed.len(),
            Err(e) => tracing::warn!("Pruning executable snapshots failed: {}", e),
        }
    }
}

/// Helper that writes a replacement script and runs it detached
///
/// The script waits for this process to exit, copies the staged executable
/// over the current one, deletes the staged copy and itself, then relaunches.
#[derive(Debug, Clone)]
pub struct ScriptReplaceHelper {
    script_dir: PathBuf,
}

impl ScriptReplaceHelper {
    pub fn new(script_dir: PathBuf) -> Self {
        Self { script_dir }
    }

    pub fn script_path(&self) -> PathBuf {
        if cfg!(windows) {
            self.script_dir.join("keepsake_update.bat")
        } else {
            self.script_dir.join("keepsake_update.sh")
        }
    }

    /// Script text for the host platform
    pub fn render_script(&self, instruction: &HandoffInstruction) -> String {
        if cfg!(windows) {
            render_batch(instruction)
        } else {
            render_shell(instruction)
        }
    }
}

impl ReplaceHelper for ScriptReplaceHelper {
    fn hand_off(&self, instruction: &HandoffInstruction) -> KeepsakeResult<()> {
        fs::create_dir_all(&self.script_dir).map_err(|e| {
            KeepsakeError::Install(format!("could not create {}: {}", self.script_dir.display(), e))
        })?;

        let script = self.script_path();
        fs::write(&script, self.render_script(instruction)).map_err(|e| {
            KeepsakeError::Install(format!("could not write {}: {}", script.display(), e))
        })?;

        spawn_detached(&script).map_err(|e| {
            KeepsakeError::Install(format!("could not start {}: {}", script.display(), e))
        })?;

        tracing::debug!("Started replacement script {}", script.display());
        Ok(())
    }
}

fn render_batch(instruction: &HandoffInstruction) -> String {
    let current = batch_quote(&instruction.current_exe.display().to_string());
    let staged = batch_quote(&instruction.staged_exe.display().to_string());
    let args: Vec<String> = instruction
        .relaunch_args
        .iter()
        .map(|a| batch_quote(a))
        .collect();

    format!(
        "@echo off\r\n\
         timeout /t 3 /nobreak >nul\r\n\
         copy /Y {staged} {current} >nul\r\n\
         if errorlevel 1 (\r\n\
         \x20   echo Failed to replace {current}\r\n\
         \x20   exit /b 1\r\n\
         )\r\n\
         del {staged} >nul 2>&1\r\n\
         start \"\" {current} {args}\r\n\
         (goto) 2>nul & del \"%~f0\"\r\n",
        staged = staged,
        current = current,
        args = args.join(" "),
    )
}

fn render_shell(instruction: &HandoffInstruction) -> String {
    let current = shell_quote(&instruction.current_exe.display().to_string());
    let staged = shell_quote(&instruction.staged_exe.display().to_string());
    let args: Vec<String> = instruction
        .relaunch_args
        .iter()
        .map(|a| shell_quote(a))
        .collect();

    format!(
        "#!/bin/sh\n\
         sleep 3\n\
         cp -f {staged} {current} || exit 1\n\
         rm -f {staged}\n\
         rm -f \"$0\"\n\
         exec {current} {args}\n",
        staged = staged,
        current = current,
        args = args.join(" "),
    )
}

fn batch_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\"").replace('%', "%%"))
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(windows)]
fn spawn_detached(script: &Path) -> std::io::Result<()> {
    use std::os::windows::process::CommandExt;
    use windows_sys::Win32::System::Threading::{CREATE_NEW_PROCESS_GROUP, DETACHED_PROCESS};

    Command::new("cmd")
        .arg("/C")
        .arg(script)
        .creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

#[cfg(not(windows))]
fn spawn_detached(script: &Path) -> std::io::Result<()> {
    use std::os::unix::process::CommandExt;

    Command::new("sh")
        .arg(script)
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}
