//! Integration tests for the keepsake CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A data directory with startup update checks disabled
fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.json"),
        r#"{"update":{"check_on_startup":false}}"#,
    )
    .unwrap();
    dir
}

fn keepsake(data: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("keepsake").unwrap();
    cmd.env("KEEPSAKE_DATA_DIR", data.path());
    cmd
}

fn create(data: &TempDir, scope: &str, file: &Path) -> String {
    let output = keepsake(data)
        .args(["backup", "create", "--scope", scope, "--file"])
        .arg(file)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Snapshot created: "))
        .expect("snapshot id in output")
        .to_string()
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("keepsake")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("backup"))
        .stdout(predicate::str::contains("update"));
}

#[test]
fn test_config_shows_paths() {
    let data = data_dir();
    keepsake(&data)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup directory"))
        .stdout(predicate::str::contains("Check on startup:    false"))
        .stdout(predicate::str::contains("Last check:   never"));
}

#[test]
fn test_list_empty() {
    let data = data_dir();
    keepsake(&data)
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No snapshots found."));
}

#[test]
fn test_create_then_list_and_info() {
    let data = data_dir();
    let work = TempDir::new().unwrap();
    let settings = work.path().join("settings.json");
    fs::write(&settings, "{\"theme\":\"dark\"}").unwrap();

    let id = create(&data, "editor", &settings);
    assert!(id.starts_with("editor_backup_"));

    keepsake(&data)
        .args(["backup", "list", "--scope", "editor"])
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()))
        .stdout(predicate::str::contains("Total: 1 snapshot(s)"));

    keepsake(&data)
        .args(["backup", "info", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("settings.json"))
        .stdout(predicate::str::contains("Status: Complete"));
}

#[test]
fn test_create_without_targets_fails() {
    let data = data_dir();
    keepsake(&data)
        .args(["backup", "create", "--scope", "editor"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("nothing to capture"));
}

#[test]
fn test_restore_requires_force() {
    let data = data_dir();
    let work = TempDir::new().unwrap();
    let settings = work.path().join("settings.json");
    fs::write(&settings, "original").unwrap();
    create(&data, "editor", &settings);
    fs::write(&settings, "changed").unwrap();

    keepsake(&data)
        .args(["backup", "restore", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));

    assert_eq!(fs::read_to_string(&settings).unwrap(), "changed");
}

#[test]
fn test_restore_with_force() {
    let data = data_dir();
    let work = TempDir::new().unwrap();
    let settings = work.path().join("settings.json");
    fs::write(&settings, "original").unwrap();
    let id = create(&data, "editor", &settings);
    fs::write(&settings, "changed").unwrap();

    keepsake(&data)
        .args(["backup", "restore", &id, "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pre-restore snapshot saved"))
        .stdout(predicate::str::contains("Restored 1 entry"));

    assert_eq!(fs::read_to_string(&settings).unwrap(), "original");

    // The overwritten content was kept in the pre_restore scope
    keepsake(&data)
        .args(["backup", "list", "--scope", "pre_restore"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 1 snapshot(s)"));
}

#[test]
fn test_restore_unknown_snapshot() {
    let data = data_dir();
    keepsake(&data)
        .args(["backup", "restore", "editor_backup_19990101_000000_000000", "--force"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Snapshot not found"));
}

#[test]
fn test_prune_keeps_newest() {
    let data = data_dir();
    let work = TempDir::new().unwrap();
    let settings = work.path().join("settings.json");
    fs::write(&settings, "v").unwrap();
    for _ in 0..3 {
        create(&data, "editor", &settings);
    }

    keepsake(&data)
        .args(["backup", "prune", "--keep", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("To be deleted: 2"));

    keepsake(&data)
        .args(["backup", "prune", "--keep", "1", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 2 snapshot(s)."));

    keepsake(&data)
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 1 snapshot(s)"));
}

#[cfg(not(windows))]
#[test]
fn test_registry_target_unavailable_off_windows() {
    let data = data_dir();
    keepsake(&data)
        .args([
            "backup",
            "create",
            "--scope",
            "editor",
            "--registry",
            r"HKCU\Software\Editor::MachineId",
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Registry"));
}
