//! Integration tests for `throwbox run` paths that never reach a hypervisor.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn throwbox() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("throwbox"));
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Workspace with an empty template directory and a job naming a template
/// that is not in it.
fn workspace() -> (TempDir, String, String) {
    let dir = TempDir::new().expect("temp dir");
    let templates = dir.path().join("boxes");
    std::fs::create_dir(&templates).expect("mkdir");
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        format!("local:\n  template_dir: {}\n", templates.display()),
    )
    .expect("write");
    let job = dir.path().join("job.yaml");
    std::fs::write(
        &job,
        "template: precise64\nrepo: ebu/throwbox\nbuild_index: 4\ntest:\n  - make check\n",
    )
    .expect("write");
    let config = config.to_string_lossy().into_owned();
    let job = job.to_string_lossy().into_owned();
    (dir, config, job)
}

#[test]
fn test_run_unknown_template_finishes_without_a_box() {
    let (_dir, config, job) = workspace();
    throwbox()
        .args(["run", &job])
        .env("THROWBOX_CONFIG", &config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("INITIALISING"))
        .stdout(predicate::str::contains("DESTROYING"))
        .stdout(predicate::str::contains("FINISHED"))
        .stdout(predicate::str::contains("STARTING").not())
        .stderr(predicate::str::contains("Invalid template 'precise64'"));
}

#[test]
fn test_run_json_reports_failure() {
    let (_dir, config, job) = workspace();
    let output = throwbox()
        .args(["--json", "run", &job])
        .env("THROWBOX_CONFIG", &config)
        .output()
        .expect("run");
    assert!(!output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["success"], false);
    let report = &value["reports"][0];
    assert_eq!(report["repo"], "ebu/throwbox");
    assert_eq!(report["build_index"], 4);
    assert!(report["error"].as_str().unwrap().contains("precise64"));
    assert_eq!(report["results"], serde_json::json!([]));
}

#[test]
fn test_run_missing_job_file_fails_before_any_job() {
    let (_dir, config, _job) = workspace();
    throwbox()
        .args(["run", "/nonexistent/job.yaml"])
        .env("THROWBOX_CONFIG", &config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("INITIALISING").not())
        .stderr(predicate::str::contains("cannot read job file"));
}
