//! Configuration module for Keepsake
//!
//! This module provides configuration management including:
//! - Platform path resolution
//! - User settings persistence
//! - The immutable update configuration

pub mod paths;
pub mod settings;
pub mod update;

pub use paths::KeepsakePaths;
pub use settings::Settings;
pub use update::UpdateConfig;
