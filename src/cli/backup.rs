//! Backup CLI commands
//!
//! Implements CLI commands for snapshot management.

use std::path::PathBuf;

use clap::Subcommand;

use super::format::{format_duration, format_size};
use crate::backup::{
    BackupManager, PrunePolicy, RestoreMode, Snapshot, SnapshotTarget, PRE_RESTORE_SCOPE,
};
use crate::config::paths::KeepsakePaths;
use crate::config::settings::Settings;
use crate::error::{KeepsakeError, KeepsakeResult};
use crate::registry::system_registry;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Snapshot files and registry values
    Create {
        /// Scope the snapshot belongs to
        #[arg(short, long)]
        scope: String,

        /// File to capture (repeatable)
        #[arg(short, long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,

        /// Registry value to capture as KEY::VALUE (repeatable)
        #[arg(short, long = "registry", value_name = "KEY::VALUE")]
        registry: Vec<String>,

        /// Free-text label
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List snapshots, newest first
    List {
        /// Only list this scope
        #[arg(short, long)]
        scope: Option<String>,

        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show information about a specific snapshot
    Info {
        /// Snapshot id (use 'latest' for most recent)
        snapshot: String,
    },

    /// Restore a snapshot
    Restore {
        /// Snapshot id (use 'latest' for most recent)
        snapshot: String,

        /// Scope used to resolve 'latest'
        #[arg(short, long)]
        scope: Option<String>,

        /// Stop at the first entry that cannot be restored
        #[arg(long)]
        strict: bool,

        /// Skip the snapshot of the current state taken before restoring
        #[arg(long)]
        no_safety_backup: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Delete old snapshots
    Prune {
        /// Keep this many snapshots per scope (default from settings)
        #[arg(short, long)]
        keep: Option<usize>,

        /// Delete snapshots older than this many days (default from settings)
        #[arg(long)]
        max_age_days: Option<u32>,

        /// Only prune this scope
        #[arg(short, long)]
        scope: Option<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Handle a backup command
pub fn handle_backup_command(
    paths: &KeepsakePaths,
    settings: &Settings,
    cmd: BackupCommands,
) -> KeepsakeResult<()> {
    let manager = BackupManager::new(paths, system_registry());

    match cmd {
        BackupCommands::Create {
            scope,
            files,
            registry,
            description,
        } => {
            let mut targets: Vec<SnapshotTarget> =
                files.into_iter().map(SnapshotTarget::File).collect();
            for value in &registry {
                targets.push(parse_registry_target(value)?);
            }
            if targets.is_empty() {
                return Err(KeepsakeError::Config(
                    "nothing to capture; pass --file or --registry".into(),
                ));
            }

            println!("Creating snapshot...");
            let snapshot = manager.create_snapshot(&scope, &targets, &description)?;
            println!("Snapshot created: {}", snapshot.id);
            println!("Location: {}", snapshot.location.display());
            println!(
                "Captured {} file(s) and {} registry value(s)",
                snapshot.file_count,
                snapshot.registry_entries.len()
            );
        }

        BackupCommands::List { scope, verbose } => {
            let listing = manager.list_snapshots(scope.as_deref())?;

            for warning in &listing.warnings {
                eprintln!(
                    "Warning: skipped {}: {}",
                    warning.path.display(),
                    warning.reason
                );
            }

            if listing.is_empty() {
                println!("No snapshots found.");
                println!("Create one with: keepsake backup create --scope <SCOPE> --file <PATH>");
                return Ok(());
            }

            println!("Available Snapshots");
            println!("===================");
            println!();

            for (i, snapshot) in listing.iter().enumerate() {
                let age = chrono::Utc::now().signed_duration_since(snapshot.created_at);
                let age_str = format_duration(age);

                if verbose {
                    println!(
                        "{}. {}\n   Scope: {}\n   Created: {}\n   Age: {}\n   Entries: {} file(s), {} registry value(s)\n   Size: {}\n   Description: {}\n",
                        i + 1,
                        snapshot.id,
                        snapshot.scope,
                        snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        age_str,
                        snapshot.file_count,
                        snapshot.registry_entries.len(),
                        format_size(stored_size(snapshot)),
                        display_description(snapshot),
                    );
                } else {
                    println!(
                        "  {}. {} ({} ago, {} entries){}",
                        i + 1,
                        snapshot.id,
                        age_str,
                        snapshot.entry_count(),
                        if snapshot.description.is_empty() {
                            String::new()
                        } else {
                            format!(" - {}", snapshot.description)
                        },
                    );
                }
            }

            println!();
            println!("Total: {} snapshot(s)", listing.len());
        }

        BackupCommands::Info { snapshot } => {
            let snapshot = resolve_snapshot(&manager, &snapshot, None)?;
            let missing = snapshot.missing_blobs();

            println!("Snapshot Details");
            println!("================");
            println!("Id: {}", snapshot.id);
            println!("Scope: {}", snapshot.scope);
            println!(
                "Created: {}",
                snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("Description: {}", display_description(&snapshot));
            println!("Location: {}", snapshot.location.display());
            println!("Size: {}", format_size(stored_size(&snapshot)));
            println!();

            if !snapshot.files.is_empty() {
                println!("Files:");
                for entry in &snapshot.files {
                    let marker = if missing.contains(&entry.stored_path) {
                        " [MISSING]"
                    } else {
                        ""
                    };
                    println!("  {}{}", entry.original_path.display(), marker);
                }
            }
            if !snapshot.registry_entries.is_empty() {
                println!("Registry values:");
                for entry in &snapshot.registry_entries {
                    println!(
                        "  {}\\{} ({})",
                        entry.key_path,
                        entry.value_name,
                        entry.value.value_type()
                    );
                }
            }
            println!();
            println!(
                "Status: {}",
                if missing.is_empty() {
                    "Complete"
                } else {
                    "Corrupt"
                }
            );
        }

        BackupCommands::Restore {
            snapshot,
            scope,
            strict,
            no_safety_backup,
            force,
        } => {
            let requested = snapshot;
            let snapshot = resolve_snapshot(&manager, &requested, scope.as_deref())?;
            // Fail before prompting if the snapshot cannot be restored
            let snapshot = manager.verify_snapshot(&snapshot.id)?;
            let mode = if strict {
                RestoreMode::Strict
            } else {
                RestoreMode::BestEffort
            };

            println!("Snapshot Information");
            println!("====================");
            println!("Id: {}", snapshot.id);
            println!(
                "Created: {}",
                snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("Entries: {}", snapshot.entry_count());
            println!("Mode: {}", mode);
            println!();

            if !force {
                println!("WARNING: This will overwrite the current files and registry values!");
                println!("To proceed, run again with --force flag:");
                println!("  keepsake backup restore {} --force", requested);
                return Ok(());
            }

            if !no_safety_backup {
                println!("Creating snapshot of current state before restore...");
                match manager.snapshot_current_state(&snapshot, PRE_RESTORE_SCOPE)? {
                    Some(safety) => println!("Pre-restore snapshot saved: {}", safety.id),
                    None => println!("Nothing to save; none of the targets currently exist."),
                }
                println!();
            }

            println!("Restoring snapshot...");
            let result = manager.restore_snapshot(&snapshot.id, mode)?;

            println!("{}", result.summary());
            if result.is_complete() {
                println!("\nAll entries have been restored successfully.");
            } else {
                println!("\nThe following entries could not be restored:");
                for failure in &result.failures {
                    println!("  {}: {}", failure.entry, failure.reason);
                }
                return Err(KeepsakeError::Io(format!(
                    "{} of {} entries failed to restore",
                    result.failures.len(),
                    result.failures.len() + result.restored.len()
                )));
            }
        }

        BackupCommands::Prune {
            keep,
            max_age_days,
            scope,
            force,
        } => {
            let mut policy = if keep.is_none() && max_age_days.is_none() {
                PrunePolicy::from_retention(&settings.backup_retention)
            } else {
                PrunePolicy {
                    keep_last: keep,
                    max_age: max_age_days.map(|d| chrono::Duration::days(i64::from(d))),
                    scope: None,
                }
            };
            policy.scope = scope;

            let plan = manager.plan_prune(&policy, chrono::Utc::now())?;

            if plan.remove.is_empty() {
                println!("No snapshots to prune.");
                println!("Policy: {}", describe_policy(&policy));
                println!("You have {} snapshot(s).", plan.kept);
                return Ok(());
            }

            println!("Prune Summary");
            println!("=============");
            println!("Policy: {}", describe_policy(&policy));
            println!("To be kept: {}", plan.kept);
            println!("To be deleted: {}", plan.remove.len());
            for snapshot in &plan.remove {
                println!("  {}", snapshot.id);
            }
            println!();

            if !force {
                println!("To delete these snapshots, run again with --force flag:");
                println!("  keepsake backup prune --force");
                return Ok(());
            }

            let report = manager.prune_snapshots(&policy)?;
            println!("Deleted {} snapshot(s).", report.removed.len());
            for failure in &report.failures {
                eprintln!("Warning: could not delete {}: {}", failure.id, failure.reason);
            }
        }
    }

    Ok(())
}

/// Resolve an id, or 'latest', to a snapshot
fn resolve_snapshot(
    manager: &BackupManager,
    snapshot: &str,
    scope: Option<&str>,
) -> KeepsakeResult<Snapshot> {
    if snapshot.eq_ignore_ascii_case("latest") {
        return manager
            .latest_snapshot(scope)?
            .ok_or_else(|| KeepsakeError::SnapshotNotFound("latest".to_string()));
    }
    manager.find_snapshot(snapshot)
}

/// Parse `KEY::VALUE`; an empty value name selects the key's default value
fn parse_registry_target(arg: &str) -> KeepsakeResult<SnapshotTarget> {
    let (key_path, value_name) = arg.rsplit_once("::").ok_or_else(|| {
        KeepsakeError::Config(format!(
            "registry target '{}' must look like HKCU\\Software\\App::ValueName",
            arg
        ))
    })?;
    if key_path.is_empty() {
        return Err(KeepsakeError::Config(format!(
            "registry target '{}' has no key path",
            arg
        )));
    }
    Ok(SnapshotTarget::registry(key_path, value_name))
}

fn stored_size(snapshot: &Snapshot) -> u64 {
    snapshot
        .files
        .iter()
        .filter_map(|entry| std::fs::metadata(snapshot.stored_file_path(entry)).ok())
        .map(|m| m.len())
        .sum()
}

fn display_description(snapshot: &Snapshot) -> &str {
    if snapshot.description.is_empty() {
        "(none)"
    } else {
        &snapshot.description
    }
}

fn describe_policy(policy: &PrunePolicy) -> String {
    let mut parts = Vec::new();
    if let Some(n) = policy.keep_last {
        parts.push(format!("keep {} per scope", n));
    }
    if let Some(age) = policy.max_age {
        parts.push(format!("delete after {} days", age.num_days()));
    }
    if let Some(scope) = &policy.scope {
        parts.push(format!("scope {}", scope));
    }
    if parts.is_empty() {
        "keep everything".to_string()
    } else {
        parts.join(", ")
    }
}
