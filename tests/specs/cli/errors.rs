//! Error reporting specs

use crate::prelude::*;

#[test]
fn unknown_subcommand_fails() {
    lh().arg("bogus").fails().stderr_has("unrecognized subcommand");
}

#[test]
fn stubborn_over_readers_fails() {
    lh().args(["drill", "--readers", "1", "--stubborn", "3"])
        .fails()
        .stderr_has("cannot exceed");
}

#[test]
fn missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    lh().args(["drill", "--config"])
        .arg(&missing)
        .fails()
        .stderr_has("io error");
}

#[test]
fn invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coordinator.toml");
    std::fs::write(&path, "queue_depth = 0\n").unwrap();

    lh().args(["drill", "--config"])
        .arg(&path)
        .fails()
        .stderr_has("queue_depth must be at least 1");
}

#[test]
fn bad_duration_fails() {
    lh().args(["drill", "--wind-down", "soon"]).fails();
}
