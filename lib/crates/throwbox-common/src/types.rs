use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which provisioning backend a box runs on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Vagrant-managed VM on the local hypervisor.
    #[default]
    Local,
    /// Dedicated EC2 instance.
    Cloud,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Cloud => f.write_str("cloud"),
        }
    }
}

/// Coarse progress marker reported to the job queue.
///
/// The main chain is strictly ordered; `StartupFailed` is a side branch that
/// can only be entered from `Starting` and only leads to `Destroying`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Initialising,
    Cloning,
    Starting,
    StartupFailed,
    Setuping,
    Testing,
    Deploying,
    Destroying,
    Finished,
}

impl JobState {
    /// Position on the main chain. `None` for the failure branch.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Initialising => Some(0),
            Self::Cloning => Some(1),
            Self::Starting => Some(2),
            Self::Setuping => Some(3),
            Self::Testing => Some(4),
            Self::Deploying => Some(5),
            Self::Destroying => Some(6),
            Self::Finished => Some(7),
            Self::StartupFailed => None,
        }
    }

    /// Whether moving from `self` to `next` is a valid forward transition.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Starting, Self::StartupFailed) | (Self::StartupFailed, Self::Destroying) => true,
            (_, Self::StartupFailed) | (Self::StartupFailed, _) => false,
            (current, next) => match (current.rank(), next.rank()) {
                (Some(a), Some(b)) => b > a,
                _ => false,
            },
        }
    }

    /// Validate and return `next`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when `next` is not reachable from `self`.
    pub fn advance(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    /// Wire name, as reported to the queue.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialising => "INITIALISING",
            Self::Cloning => "CLONING",
            Self::Starting => "STARTING",
            Self::StartupFailed => "STARTUP_FAILED",
            Self::Setuping => "SETUPING",
            Self::Testing => "TESTING",
            Self::Deploying => "DEPLOYING",
            Self::Destroying => "DESTROYING",
            Self::Finished => "FINISHED",
        }
    }

    /// `true` once nothing more will be reported for the job.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Finished
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected job state transition.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid job state transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobState,
    pub to: JobState,
}

/// Outcome of one test-phase command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestResult {
    pub command: String,
    pub exit_code: i32,
    pub passed: bool,
}

impl TestResult {
    /// Build a result; `passed` is derived from the exit code.
    #[must_use]
    pub fn new(command: impl Into<String>, exit_code: i32) -> Self {
        Self {
            command: command.into(),
            exit_code,
            passed: exit_code == 0,
        }
    }
}
