//! Keepsake - snapshot, restore and self-update core
//!
//! This library backs the `keepsake` command-line tool. It captures files and
//! Windows registry values into timestamped snapshots before they are
//! modified, restores them on request, and keeps the tool itself current
//! through a forced self-update flow.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Path resolution, user settings and the update configuration
//! - `error`: Custom error types
//! - `storage`: Atomic JSON and file helpers
//! - `registry`: Typed registry values behind a swappable store
//! - `backup`: Snapshot creation, restore and retention
//! - `update`: Release checks, downloads and the executable handoff
//! - `cli`: clap command handlers
//!
//! # Example
//!
//! ```rust,ignore
//! use keepsake::config::{paths::KeepsakePaths, settings::Settings};
//!
//! let paths = KeepsakePaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod registry;
pub mod storage;
pub mod update;

pub use error::{KeepsakeError, KeepsakeResult};
