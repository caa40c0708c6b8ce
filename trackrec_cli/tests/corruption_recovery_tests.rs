//! Corruption recovery tests for trackrec.
//!
//! These tests verify the CLI can handle:
//! - Corrupted track records
//! - Records with missing fields
//! - Stored distances that disagree with the points
//! - Unreadable storage

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cli(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("trackrec"));
    cmd.env("XDG_CONFIG_HOME", temp_dir.path().join("config"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_corrupted_record_is_discarded() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let record_path = data_dir.join("gpsTrack.json");
    fs::write(&record_path, "{ invalid json }}}}").expect("Failed to write corrupted record");

    cli(&temp_dir)
        .arg("status")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Points: 0"));

    // Treated as if no record ever existed
    assert!(!record_path.exists());
}

#[test]
fn test_record_after_corruption_starts_fresh() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    fs::write(data_dir.join("gpsTrack.json"), "corrupted").unwrap();
    let input = data_dir.join("walk.csv");
    fs::write(&input, "10,10\n").unwrap();

    cli(&temp_dir)
        .arg("record")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Points: 1"));

    let raw = fs::read_to_string(data_dir.join("gpsTrack.json")).expect("Record should exist");
    let parsed: Result<serde_json::Value, _> = serde_json::from_str(&raw);
    assert!(parsed.is_ok(), "Record should be valid JSON");
}

#[test]
fn test_missing_fields_default() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    fs::write(data_dir.join("gpsTrack.json"), r#"{"points":[[1,2]]}"#).unwrap();

    cli(&temp_dir)
        .arg("status")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Points: 1"))
        .stdout(predicate::str::contains("Distance: 0.00 km"))
        .stdout(predicate::str::contains("Coordinates: 1.00000, 2.00000"));
}

#[test]
fn test_stored_distance_is_trusted_but_verifiable() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    fs::write(
        data_dir.join("gpsTrack.json"),
        r#"{"points":[[0,0],[0,1]],"distance":5}"#,
    )
    .unwrap();

    cli(&temp_dir)
        .arg("status")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("Distance: 5.00 km"))
        .stdout(predicate::str::contains("Recomputed: 111.19 km"))
        .stdout(predicate::str::contains("differs"));
}

#[test]
fn test_empty_record_file() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    fs::write(data_dir.join("gpsTrack.json"), "").unwrap();

    cli(&temp_dir)
        .arg("export")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--out-dir")
        .arg(data_dir.join("exports"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to export"));
}

#[test]
fn test_unreadable_record() {
    // Skip on Windows (permission model is different)
    if cfg!(windows) {
        return;
    }

    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();
    let record_path = data_dir.join("gpsTrack.json");
    let record = r#"{"points":[[0,0],[0,1]],"distance":111.19}"#;
    fs::write(&record_path, record).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&record_path).unwrap().permissions();
        perms.set_mode(0o000); // No permissions
        fs::set_permissions(&record_path, perms).unwrap();

        // Privileged users read through mode 0o000; the directory case below
        // covers the read failure for them
        if fs::read_to_string(&record_path).is_err() {
            cli(&temp_dir)
                .arg("status")
                .arg("--data-dir")
                .arg(&data_dir)
                .assert()
                .success()
                .stdout(predicate::str::contains("Points: 0"))
                .stderr(predicate::str::contains("Unable to read stored track"));
        }

        // Clean up permissions for temp dir cleanup
        let mut perms = fs::metadata(&record_path).unwrap().permissions();
        perms.set_mode(0o644);
        fs::set_permissions(&record_path, perms).unwrap();
    }

    // A read failure is not corruption: the record is left in place
    assert_eq!(fs::read_to_string(&record_path).unwrap(), record);
    cli(&temp_dir)
        .arg("status")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Points: 2"));
}

#[test]
fn test_record_path_is_a_directory() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();
    let record_path = data_dir.join("gpsTrack.json");
    fs::create_dir(&record_path).unwrap();
    fs::write(record_path.join("stray"), "x").unwrap();

    cli(&temp_dir)
        .arg("status")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Points: 0"))
        .stderr(predicate::str::contains("Unable to read stored track"));

    assert!(record_path.join("stray").exists());
}
