//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup and update layers.

pub mod backup;
pub mod format;
pub mod prompt;
pub mod update;

pub use backup::{handle_backup_command, BackupCommands};
pub use update::{handle_update_command, run_startup_check, StartupAction, UpdateCommands};
