//! Storage helpers shared by the backup and update subsystems
//!
//! Snapshot metadata and update state are plain JSON files written with
//! [`file_io::write_json_atomic`].

pub mod file_io;

pub use file_io::{copy_file_synced, read_json_required, remove_files_older_than, write_json_atomic};
