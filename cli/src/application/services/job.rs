//! Job service: drives one box through its lifecycle and reports every
//! coarse state transition.

use std::path::PathBuf;

use chrono::Utc;
use throwbox_common::{JobReport, JobRequest, JobState, TransitionError};

use crate::application::ports::{GitClient, JobStateSink, RemoteShell};
use crate::application::services::vm::{BoxBackend, BoxSpec, ThrowBox};
use crate::domain::{BoxError, Phase, SetupFailurePolicy};

/// Tracks the current state of one job and forwards each valid transition
/// to a sink.
pub struct StateTracker<'a, K: JobStateSink> {
    job_id: &'a str,
    sink: K,
    current: JobState,
}

impl<'a, K: JobStateSink> StateTracker<'a, K> {
    /// Start tracking; reports `INITIALISING` immediately.
    pub fn new(job_id: &'a str, sink: K) -> Self {
        sink.report(job_id, JobState::Initialising);
        Self {
            job_id,
            sink,
            current: JobState::Initialising,
        }
    }

    /// Move to `next` and report it.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] for a backward or off-branch move; nothing
    /// is reported then.
    pub fn advance(&mut self, next: JobState) -> Result<(), TransitionError> {
        self.current = self.current.advance(next)?;
        tracing::debug!(job = self.job_id, state = %next, "job state");
        self.sink.report(self.job_id, next);
        Ok(())
    }

    #[must_use]
    pub fn current(&self) -> JobState {
        self.current
    }
}

/// Job settings that come from configuration rather than the request.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Repository key used when the request names none.
    pub default_key: Option<PathBuf>,
    pub setup_policy: SetupFailurePolicy,
}

/// Run one job to completion. Never fails: errors end up in the report.
///
/// The box is destroyed on every path, after `DESTROYING` is reported;
/// `FINISHED` is always the last state reported.
pub async fn run_job<B, S, G>(
    job_id: &str,
    request: &JobRequest,
    backend: B,
    shell: S,
    git: G,
    options: &JobOptions,
    sink: impl JobStateSink,
) -> JobReport
where
    B: BoxBackend,
    S: RemoteShell,
    G: GitClient,
{
    let started_at = Utc::now();
    let mut tracker = StateTracker::new(job_id, sink);
    let mut report = JobReport {
        job_id: job_id.to_string(),
        repo: request.repo.clone(),
        build_index: request.build_index,
        commit_sha: None,
        commit_message: None,
        setup_output: String::new(),
        test_output: String::new(),
        deploy_output: String::new(),
        results: Vec::new(),
        error: None,
        started_at,
        finished_at: started_at,
    };

    let spec = BoxSpec::from_request(request, options.default_key.as_deref(), options.setup_policy);
    match ThrowBox::create(backend, shell, git, spec).await {
        Ok(mut throwbox) => {
            if let Err(e) = drive(&mut throwbox, &mut tracker, &mut report).await {
                tracing::warn!(job = job_id, error = %e, "job aborted");
                report.error = Some(e.to_string());
            }
            finish(&mut tracker, job_id, JobState::Destroying);
            throwbox.destroy().await;
            let ledger = throwbox.ledger();
            report.setup_output = ledger.text(Phase::Setup);
            report.test_output = ledger.text(Phase::Test);
            report.deploy_output = ledger.text(Phase::Deploy);
            report.results = throwbox.results().to_vec();
        }
        Err(e) => {
            tracing::warn!(job = job_id, error = %e, "box could not be created");
            report.error = Some(e.to_string());
            finish(&mut tracker, job_id, JobState::Destroying);
        }
    }
    report.finished_at = Utc::now();
    finish(&mut tracker, job_id, JobState::Finished);
    tracing::info!(
        job = job_id,
        success = report.success(),
        failed = report.failed_count(),
        "job finished"
    );
    report
}

fn finish<K: JobStateSink>(tracker: &mut StateTracker<'_, K>, job_id: &str, state: JobState) {
    if let Err(e) = tracker.advance(state) {
        tracing::error!(job = job_id, error = %e, "unreportable job state");
    }
}

async fn drive<B, S, G, K>(
    throwbox: &mut ThrowBox<B, S, G>,
    tracker: &mut StateTracker<'_, K>,
    report: &mut JobReport,
) -> Result<(), BoxError>
where
    B: BoxBackend,
    S: RemoteShell,
    G: GitClient,
    K: JobStateSink,
{
    tracker.advance(JobState::Cloning)?;
    throwbox.clone_repo().await?;
    if throwbox.is_cloned() {
        report.commit_sha = Some(throwbox.top_commit_sha().await?);
        report.commit_message = Some(throwbox.top_commit_message().await?);
    }

    tracker.advance(JobState::Starting)?;
    if let Err(e) = throwbox.up().await {
        tracker.advance(JobState::StartupFailed)?;
        return Err(e);
    }

    tracker.advance(JobState::Setuping)?;
    throwbox.setup().await?;

    tracker.advance(JobState::Testing)?;
    throwbox.test().await?;

    tracker.advance(JobState::Deploying)?;
    throwbox.deploy().await
}
