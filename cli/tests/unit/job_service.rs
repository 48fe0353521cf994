//! Job state machine scenarios: state sequences, report contents and
//! concurrent jobs sharing adapters.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use futures_util::future::join_all;
use throwbox_cli::application::services::job::{JobOptions, run_job};
use throwbox_cli::application::services::vm::{LocalBackend, ProvisionLock};
use throwbox_cli::domain::SetupFailurePolicy;
use throwbox_cli::domain::config::ReadinessPolicy;
use throwbox_cli::infra::queue::ChannelReporter;
use throwbox_common::{BackendKind, JobRequest, JobState};

use crate::helpers::{FakeGit, FakeShell, FakeVagrant, HEAD_SHA, RecordingSink, template_dir};

use JobState::{
    Cloning, Deploying, Destroying, Finished, Initialising, Setuping, Starting, StartupFailed,
    Testing,
};

fn request(setup: &[&str], test: &[&str], deploy: &[&str]) -> JobRequest {
    let owned = |list: &[&str]| list.iter().map(|s| (*s).to_string()).collect();
    JobRequest {
        setup: owned(setup),
        test: owned(test),
        deploy: owned(deploy),
        repo_url: "https://github.com/ebu/throwbox.git".to_string(),
        template: "precise64".to_string(),
        backend: BackendKind::Local,
        private_key: None,
        repo: "ebu/throwbox".to_string(),
        build_index: 12,
    }
}

fn backend<'a>(vagrant: &'a FakeVagrant, templates: &tempfile::TempDir) -> LocalBackend<&'a FakeVagrant> {
    LocalBackend::new(
        vagrant,
        Some(templates.path().to_path_buf()),
        ProvisionLock::new(),
        ReadinessPolicy::immediate(3),
    )
}

#[tokio::test]
async fn test_successful_job_walks_the_full_chain() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let sink = RecordingSink::default();
    let report = run_job(
        "job-a",
        &request(&["echo deps"], &["true", "echo ok"], &["echo shipped"]),
        backend(&vagrant, &templates),
        FakeShell::default(),
        FakeGit::default(),
        &JobOptions::default(),
        &sink,
    )
    .await;

    assert_eq!(
        sink.states("job-a"),
        vec![Initialising, Cloning, Starting, Setuping, Testing, Deploying, Destroying, Finished]
    );
    assert!(report.success());
    assert_eq!(report.commit_sha.as_deref(), Some(HEAD_SHA));
    assert_eq!(
        report.commit_message.as_deref(),
        Some("Fix flaky deploy step\n\nRetry the upload once.")
    );
    assert_eq!(report.results.len(), 2);
    assert!(report.setup_output.contains("deps"));
    assert!(report.deploy_output.contains("shipped"));
    assert_eq!(report.build_index, 12);
    assert_eq!(vagrant.count("destroy"), 1);
}

#[tokio::test]
async fn test_failing_tests_do_not_abort_the_job() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let sink = RecordingSink::default();
    let report = run_job(
        "job-b",
        &request(&[], &["exit 2", "true"], &["echo shipped"]),
        backend(&vagrant, &templates),
        FakeShell::default(),
        FakeGit::default(),
        &JobOptions::default(),
        &sink,
    )
    .await;

    assert!(report.error.is_none());
    assert!(!report.success());
    assert_eq!(report.failed_count(), 1);
    assert!(sink.states("job-b").contains(&Deploying));
    assert!(report.deploy_output.contains("shipped"));
}

#[tokio::test]
async fn test_setup_failure_skips_test_and_deploy() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let sink = RecordingSink::default();
    let shell = FakeShell::default();
    let report = run_job(
        "job-c",
        &request(&["true", "false", "echo never"], &["true"], &["echo never"]),
        backend(&vagrant, &templates),
        shell.clone(),
        FakeGit::default(),
        &JobOptions::default(),
        &sink,
    )
    .await;

    assert_eq!(
        sink.states("job-c"),
        vec![Initialising, Cloning, Starting, Setuping, Destroying, Finished]
    );
    assert!(report.error.as_deref().unwrap_or_default().contains("false"));
    assert!(report.results.is_empty());
    assert!(report.test_output.is_empty());
    assert!(!shell.commands().iter().any(|c| c == "echo never"));
    assert_eq!(vagrant.count("destroy"), 1);
}

#[tokio::test]
async fn test_continue_policy_runs_tests_after_setup_failure() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let sink = RecordingSink::default();
    let options = JobOptions {
        default_key: None,
        setup_policy: SetupFailurePolicy::Continue,
    };
    let report = run_job(
        "job-d",
        &request(&["false"], &["true"], &[]),
        backend(&vagrant, &templates),
        FakeShell::default(),
        FakeGit::default(),
        &options,
        &sink,
    )
    .await;

    assert!(report.error.is_none());
    assert_eq!(report.results.len(), 1);
    assert!(sink.states("job-d").contains(&Testing));
}

#[tokio::test]
async fn test_startup_failure_takes_the_side_branch() {
    let vagrant = FakeVagrant {
        never_runs: true,
        ..FakeVagrant::default()
    };
    let templates = template_dir();
    let sink = RecordingSink::default();
    let report = run_job(
        "job-e",
        &request(&["true"], &["true"], &[]),
        backend(&vagrant, &templates),
        FakeShell::default(),
        FakeGit::default(),
        &JobOptions::default(),
        &sink,
    )
    .await;

    assert_eq!(
        sink.states("job-e"),
        vec![Initialising, Cloning, Starting, StartupFailed, Destroying, Finished]
    );
    assert!(report.error.is_some());
    assert_eq!(vagrant.count("destroy"), 1);
}

#[tokio::test]
async fn test_clone_failure_never_starts_a_machine() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let sink = RecordingSink::default();
    let mut job = request(&[], &["true"], &[]);
    job.repo_url = "https://example.org/does-not-exist.git".to_string();
    let report = run_job(
        "job-f",
        &job,
        backend(&vagrant, &templates),
        FakeShell::default(),
        FakeGit::default(),
        &JobOptions::default(),
        &sink,
    )
    .await;

    assert_eq!(
        sink.states("job-f"),
        vec![Initialising, Cloning, Destroying, Finished]
    );
    assert!(report.commit_sha.is_none());
    assert!(vagrant.calls.borrow().is_empty());
}

#[tokio::test]
async fn test_concurrent_jobs_publish_on_one_channel() {
    let vagrant = FakeVagrant::default();
    let templates = template_dir();
    let local = backend(&vagrant, &templates);
    let shell = FakeShell::default();
    let git = FakeGit::default();
    let options = JobOptions::default();
    let (reporter, mut events) = ChannelReporter::channel();
    let requests = [request(&[], &["true"], &[]), request(&[], &["false"], &[])];

    let jobs: Vec<_> = requests
        .iter()
        .enumerate()
        .map(|(i, job)| {
            let reporter = reporter.clone();
            let (local, shell, git, options) = (&local, &shell, &git, &options);
            async move { run_job(&format!("job-{i}"), job, local, shell, git, options, reporter).await }
        })
        .collect();
    drop(reporter);
    let reports = join_all(jobs).await;

    let mut per_job: [Vec<JobState>; 2] = [Vec::new(), Vec::new()];
    while let Some(event) = events.recv().await {
        let index: usize = event.job_id["job-".len()..].parse().expect("index");
        per_job[index].push(event.state);
    }
    for states in &per_job {
        assert_eq!(states.first(), Some(&Initialising));
        assert_eq!(states.last(), Some(&Finished));
    }
    assert!(reports[0].success());
    assert!(!reports[1].success());
    assert_eq!(vagrant.count("up"), 2);
    assert_eq!(vagrant.count("destroy"), 2);
}
