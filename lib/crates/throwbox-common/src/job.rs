use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{BackendKind, JobState, TestResult};

/// One CI job as submitted to a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRequest {
    /// Commands run before the tests; the first failure aborts the job.
    #[serde(default)]
    pub setup: Vec<String>,
    /// Test commands; every one runs and yields a `TestResult`.
    #[serde(default)]
    pub test: Vec<String>,
    /// Best-effort distribution steps run after the tests.
    #[serde(default)]
    pub deploy: Vec<String>,
    /// Repository to clone. Empty means "do not clone".
    #[serde(default)]
    pub repo_url: String,
    /// Template name, validated against the backend's template set.
    pub template: String,
    #[serde(default)]
    pub backend: BackendKind,
    /// Private key used for repository access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PathBuf>,
    /// Repository identifier in external result storage.
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub build_index: u64,
}

impl JobRequest {
    /// Repository URL, or `None` when cloning is disabled.
    #[must_use]
    pub fn repo_url(&self) -> Option<&str> {
        let url = self.repo_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// Aggregated outcome of one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: String,
    pub repo: String,
    pub build_index: u64,
    /// HEAD commit hash; absent when the job failed before cloning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    pub setup_output: String,
    pub test_output: String,
    pub deploy_output: String,
    pub results: Vec<TestResult>,
    /// Error that aborted the job, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    /// `true` when the job ran to completion and every test passed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.error.is_none() && self.results.iter().all(|r| r.passed)
    }

    /// Number of failed test commands.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }
}

/// One job state transition, as published to the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobEvent {
    pub job_id: String,
    pub state: JobState,
    pub at: DateTime<Utc>,
}

impl JobEvent {
    /// Event for `state`, stamped now.
    #[must_use]
    pub fn now(job_id: impl Into<String>, state: JobState) -> Self {
        Self {
            job_id: job_id.into(),
            state,
            at: Utc::now(),
        }
    }
}
