//! Drill specs
//!
//! Verify lease preemption as reported by `lh drill`.

use crate::prelude::*;

#[test]
fn drill_preempts_every_reader() {
    lh().args(["drill", "--readers", "4", "--wind-down", "10ms"])
        .passes()
        .stdout_has("Readers admitted: 4")
        .stdout_has("Preempted: 4")
        .stdout_has("Force-released: 0")
        .stdout_has("After shutdown: fallback lock");
}

#[test]
fn drill_forces_out_stubborn_readers() {
    let run = lh()
        .args(["drill", "--readers", "3", "--stubborn", "1", "--format", "json"])
        .passes();

    let report = run.json();
    similar_asserts::assert_eq!(report["preempted"].as_u64(), Some(3));
    similar_asserts::assert_eq!(report["force_released"].as_u64(), Some(1));
    assert!(report["exclusive_wait_ms"].as_u64().unwrap() >= 2000);
}

#[test]
fn drill_respects_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coordinator.toml");
    std::fs::write(
        &path,
        "name = \"nightly\"\nfallback_after_shutdown = false\n",
    )
    .unwrap();

    lh().args(["drill", "--readers", "1", "--wind-down", "1ms", "--config"])
        .arg(&path)
        .passes()
        .stdout_has("Coordinator: nightly")
        .stdout_has("After shutdown: closed");
}

#[test]
fn log_file_receives_coordinator_logs() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("drill.log");

    lh().args(["drill", "--readers", "2", "--wind-down", "1ms", "--log-file"])
        .arg(&log)
        .env("RUST_LOG", "info")
        .passes();

    let content = std::fs::read_to_string(&log).unwrap();
    assert!(content.contains("lock coordinator closed"), "log was:\n{content}");
}
