//! Box lifecycle scenarios driven through the public `ThrowBox` API with
//! stubbed machines, shells and git.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use futures_util::future::join_all;
use throwbox_cli::application::services::vm::{
    BoxSpec, CloudBackend, LocalBackend, ProvisionLock, ThrowBox,
};
use throwbox_cli::domain::config::{CloudConfig, ReadinessPolicy};
use throwbox_cli::domain::{BoxError, BoxPhase, Phase};

use crate::helpers::{
    FakeEc2, FakeGit, FakeShell, FakeVagrant, HEAD_SHA, template_dir,
};

fn spec(setup: &[&str], test: &[&str], deploy: &[&str]) -> BoxSpec {
    let owned = |list: &[&str]| list.iter().map(|s| (*s).to_string()).collect();
    BoxSpec {
        setup: owned(setup),
        test: owned(test),
        deploy: owned(deploy),
        template: "precise64".to_string(),
        ..BoxSpec::default()
    }
}

fn local<'a>(
    vagrant: &'a FakeVagrant,
    templates: &tempfile::TempDir,
    lock: &ProvisionLock,
) -> LocalBackend<&'a FakeVagrant> {
    LocalBackend::new(
        vagrant,
        Some(templates.path().to_path_buf()),
        lock.clone(),
        ReadinessPolicy::immediate(3),
    )
}

// ── Template resolution ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_unknown_template_is_rejected_before_provisioning() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let mut request = spec(&[], &[], &[]);
    request.template = "windows2012".to_string();
    let err = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        FakeShell::default(),
        FakeGit::default(),
        request,
    )
    .await
    .err()
    .expect("must fail");
    assert!(err.is_invalid_template());
    assert!(vagrant.calls.borrow().is_empty());
}

#[tokio::test]
async fn test_template_is_copied_as_vagrantfile() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let mut b = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        FakeShell::default(),
        FakeGit::default(),
        spec(&[], &[], &[]),
    )
    .await
    .expect("create");
    let copied = std::fs::read_to_string(b.workdir().join("Vagrantfile")).expect("vagrantfile");
    assert!(copied.contains("precise64"));
    b.destroy().await;
}

// ── Phases ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_echo_setup_is_recorded_without_results() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let mut b = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        FakeShell::default(),
        FakeGit::default(),
        spec(&["echo bou"], &[], &[]),
    )
    .await
    .expect("create");
    b.up().await.expect("up");
    assert!(b.setup().await.expect("setup"));
    b.test().await.expect("test");

    let buckets = b.ledger().buckets();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].pairs(), vec![("echo bou", "bou")]);
    assert!(buckets[1].pairs().is_empty());
    assert!(b.results().is_empty());
    b.destroy().await;
}

#[tokio::test]
async fn test_first_failing_setup_command_stops_the_phase() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let shell = FakeShell::default();
    let mut b = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        shell.clone(),
        FakeGit::default(),
        spec(&["true", "true", "false", "echo bou"], &["true"], &[]),
    )
    .await
    .expect("create");
    b.up().await.expect("up");

    let err = b.setup().await.unwrap_err();
    assert!(matches!(
        err,
        BoxError::SetupScriptFailed { ref command, exit_code: 1 } if command == "false"
    ));
    assert_eq!(
        b.ledger().buckets()[0].pairs(),
        vec![("true", ""), ("true", ""), ("false", "")]
    );
    assert!(!shell.commands().iter().any(|c| c == "echo bou"));
    assert_eq!(b.phase(), BoxPhase::SetupFailed);
    assert!(b.test().await.is_err());
    b.destroy().await;
}

#[tokio::test]
async fn test_every_test_command_yields_a_result_in_order() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let mut b = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        FakeShell::default(),
        FakeGit::default(),
        spec(&[], &["false", "true", "true"], &[]),
    )
    .await
    .expect("create");
    b.up().await.expect("up");
    b.setup().await.expect("setup");
    b.test().await.expect("test");
    let passed: Vec<bool> = b.results().iter().map(|r| r.passed).collect();
    assert_eq!(passed, vec![false, true, true]);
    assert_eq!(b.results()[0].exit_code, 1);
    assert_eq!(b.results()[0].command, "false");
    b.destroy().await;
}

#[tokio::test]
async fn test_deploy_continues_past_failures_without_results() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let shell = FakeShell::default();
    let mut b = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        shell.clone(),
        FakeGit::default(),
        spec(&[], &[], &["exit 3", "echo shipped"]),
    )
    .await
    .expect("create");
    b.up().await.expect("up");
    b.setup().await.expect("setup");
    b.test().await.expect("test");
    b.deploy().await.expect("deploy");
    assert!(b.results().is_empty());
    assert_eq!(
        b.ledger().buckets()[2].pairs(),
        vec![("exit 3", ""), ("echo shipped", "shipped")]
    );
    b.destroy().await;
}

#[tokio::test]
async fn test_three_buckets_even_with_empty_lists() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let mut b = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        FakeShell::default(),
        FakeGit::default(),
        spec(&[], &[], &[]),
    )
    .await
    .expect("create");
    b.up().await.expect("up");
    b.setup().await.expect("setup");
    b.test().await.expect("test");
    b.deploy().await.expect("deploy");
    let phases: Vec<Phase> = b.ledger().buckets().iter().map(|x| x.phase).collect();
    assert_eq!(phases, vec![Phase::Setup, Phase::Test, Phase::Deploy]);
    assert!(b.ledger().buckets().iter().all(|x| x.entries.is_empty()));
    b.destroy().await;
}

// ── Destroy ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_destroy_twice_has_no_second_effect() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let mut b = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        FakeShell::default(),
        FakeGit::default(),
        spec(&[], &[], &[]),
    )
    .await
    .expect("create");
    b.up().await.expect("up");
    let workdir = b.workdir().to_path_buf();
    b.destroy().await;
    b.destroy().await;
    assert_eq!(vagrant.count("destroy"), 1);
    assert!(!workdir.exists());
    assert_eq!(b.phase(), BoxPhase::Destroyed);
    assert!(matches!(b.setup().await, Err(BoxError::Destroyed)));
}

#[tokio::test]
async fn test_destroy_before_up_only_removes_workdir() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let mut b = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        FakeShell::default(),
        FakeGit::default(),
        spec(&[], &[], &[]),
    )
    .await
    .expect("create");
    let workdir = b.workdir().to_path_buf();
    b.destroy().await;
    assert!(vagrant.calls.borrow().is_empty());
    assert!(!workdir.exists());
}

#[tokio::test]
async fn test_dropping_undestroyed_box_removes_workdir() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let b = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        FakeShell::default(),
        FakeGit::default(),
        spec(&[], &[], &[]),
    )
    .await
    .expect("create");
    let workdir = b.workdir().to_path_buf();
    drop(b);
    assert!(!workdir.exists());
}

// ── Startup ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_machine_that_never_runs_is_a_startup_failure() {
    let vagrant = FakeVagrant {
        never_runs: true,
        ..FakeVagrant::default()
    };
    let templates = template_dir();
    let mut b = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        FakeShell::default(),
        FakeGit::default(),
        spec(&["true"], &[], &[]),
    )
    .await
    .expect("create");
    let err = b.up().await.unwrap_err();
    assert!(matches!(err, BoxError::StartFailed { .. }));
    assert_eq!(b.phase(), BoxPhase::StartFailed);
    assert_eq!(vagrant.count("status"), 3);
    b.destroy().await;
    assert_eq!(vagrant.count("destroy"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_local_provisioning_is_serialised() {
    let vagrant = FakeVagrant::slow(Duration::from_secs(30));
    let templates = template_dir();
    let lock = ProvisionLock::new();
    let mut boxes = Vec::new();
    for _ in 0..3 {
        boxes.push(
            ThrowBox::create(
                local(&vagrant, &templates, &lock),
                FakeShell::default(),
                FakeGit::default(),
                spec(&[], &[], &[]),
            )
            .await
            .expect("create"),
        );
    }
    let outcomes = join_all(boxes.iter_mut().map(|b| b.up())).await;
    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(vagrant.count("up"), 3);
    assert_eq!(vagrant.max_in_flight.get(), 1);
    for b in &mut boxes {
        b.destroy().await;
    }
}

// ── Repository ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_clone_yields_commit_metadata_and_readme() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let mut request = spec(&[], &[], &[]);
    request.repo_url = Some("https://github.com/ebu/throwbox.git".to_string());
    let mut b = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        FakeShell::default(),
        FakeGit::default(),
        request,
    )
    .await
    .expect("create");
    b.clone_repo().await.expect("clone");
    let sha = b.top_commit_sha().await.expect("sha");
    assert_eq!(sha, HEAD_SHA);
    assert_eq!(sha.len(), 40);
    let message = b.top_commit_message().await.expect("message");
    assert!(message.starts_with("Fix flaky deploy step"));
    assert!(b.workdir().join("repo").join("README.md").is_file());
    b.destroy().await;
}

#[tokio::test]
async fn test_failed_clone_is_reported() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let mut request = spec(&[], &[], &[]);
    request.repo_url = Some("https://example.org/does-not-exist.git".to_string());
    let mut b = ThrowBox::create(
        local(&vagrant, &templates, &ProvisionLock::new()),
        FakeShell::default(),
        FakeGit::default(),
        request,
    )
    .await
    .expect("create");
    assert!(b.clone_repo().await.is_err());
    assert!(!b.is_cloned());
    assert!(matches!(b.top_commit_sha().await, Err(BoxError::NotCloned)));
    b.destroy().await;
}

// ── Cloud ────────────────────────────────────────────────────────────────────

fn cloud<'a>(ec2: &'a FakeEc2, lock: &ProvisionLock) -> CloudBackend<&'a FakeEc2> {
    CloudBackend::new(ec2, &CloudConfig::default(), lock.clone())
        .with_readiness(ReadinessPolicy::immediate(3))
}

#[tokio::test]
async fn test_cloud_box_uploads_clone_and_cleans_up_key() {
    let ec2 = FakeEc2::default();
    let shell = FakeShell::default();
    let mut request = spec(&["true"], &[], &[]);
    request.template = "ami-0a1b2c3d".to_string();
    request.repo_url = Some("https://github.com/ebu/throwbox.git".to_string());
    let mut b = ThrowBox::create(
        cloud(&ec2, &ProvisionLock::new()),
        shell.clone(),
        FakeGit::default(),
        request,
    )
    .await
    .expect("create");
    b.clone_repo().await.expect("clone");
    b.up().await.expect("up");
    b.setup().await.expect("setup");

    let uploads = shell.uploads.borrow().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].1, "repo");
    assert_eq!(ec2.count("create-security-group"), 1);
    assert_eq!(ec2.count("create-key-pair"), 1);

    b.destroy().await;
    assert_eq!(ec2.count("terminate"), 1);
    assert_eq!(ec2.count("delete-key-pair"), 1);
}

#[tokio::test]
async fn test_unknown_image_is_invalid_template() {
    let ec2 = FakeEc2::default();
    let mut request = spec(&[], &[], &[]);
    request.template = "ami-ffffffff".to_string();
    let err = ThrowBox::create(
        cloud(&ec2, &ProvisionLock::new()),
        FakeShell::default(),
        FakeGit::default(),
        request,
    )
    .await
    .err()
    .expect("must fail");
    assert!(err.is_invalid_template());
    assert_eq!(ec2.count("run-instances"), 0);
}

#[tokio::test]
async fn test_security_group_is_created_once_under_concurrency() {
    let ec2 = FakeEc2::default();
    let lock = ProvisionLock::new();
    let mut boxes = Vec::new();
    for _ in 0..3 {
        let mut request = spec(&[], &[], &[]);
        request.template = "ami-0a1b2c3d".to_string();
        boxes.push(
            ThrowBox::create(
                cloud(&ec2, &lock),
                FakeShell::default(),
                FakeGit::default(),
                request,
            )
            .await
            .expect("create"),
        );
    }
    let outcomes = join_all(boxes.iter_mut().map(|b| b.up())).await;
    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(ec2.count("create-security-group"), 1);
    assert_eq!(ec2.count("run-instances"), 3);
    for b in &mut boxes {
        b.destroy().await;
    }
}
