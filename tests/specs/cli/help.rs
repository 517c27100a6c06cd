//! Help output specs

use crate::prelude::*;

#[test]
fn help_lists_subcommands() {
    lh().arg("--help")
        .passes()
        .stdout_has("drill")
        .stdout_has("keys");
}

#[test]
fn drill_help_documents_flags() {
    lh().args(["drill", "--help"])
        .passes()
        .stdout_has("--readers")
        .stdout_has("--stubborn")
        .stdout_has("--wind-down");
}

#[test]
fn version_flag_prints_version() {
    lh().arg("--version").passes().stdout_has("lh");
}
