//! Per-key lock map specs

use crate::prelude::*;

#[test]
fn keys_reports_every_key() {
    lh().args(["keys", "--workers", "4", "--keys", "a,b", "--rounds", "10"])
        .passes()
        .stdout_has("a: ")
        .stdout_has("b: ")
        .stdout_has("Remaining entries: 0");
}

#[test]
fn keys_json_counts_all_acquisitions() {
    let run = lh()
        .args(["keys", "--workers", "3", "--keys", "x,y,z", "--rounds", "20", "--format", "json"])
        .passes();

    let report = run.json();
    let total: u64 = report["keys"]
        .as_array()
        .unwrap()
        .iter()
        .map(|k| k["acquisitions"].as_u64().unwrap())
        .sum();
    similar_asserts::assert_eq!(total, 60);
    similar_asserts::assert_eq!(report["remaining_entries"].as_u64(), Some(0));
}

#[test]
fn keys_without_keys_fails() {
    lh().args(["keys", "--keys", ","])
        .fails()
        .stderr_has("at least one key");
}
