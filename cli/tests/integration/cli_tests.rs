//! Integration tests for the CLI skeleton: help, version and command tree.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn throwbox() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("throwbox"));
    cmd.env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    throwbox().assert().code(2).stderr(predicate::str::contains(
        "Run CI jobs in throwaway virtual machines",
    ));
}

#[test]
fn test_cli_help_lists_commands() {
    throwbox()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("templates"))
        .stdout(predicate::str::contains("pubkey"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command_shows_version() {
    throwbox()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(concat!(
            "throwbox ",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let output = throwbox()
        .args(["version", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_unknown_subcommand_is_usage_error() {
    throwbox()
        .arg("provision")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_run_requires_a_job_file() {
    throwbox()
        .arg("run")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("JOBS"));
}

#[test]
fn test_no_color_env_accepts_conventional_values() {
    for value in ["1", "yes", "", "0"] {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("throwbox"));
        cmd.env("NO_COLOR", value).arg("version").assert().success();
    }
}
