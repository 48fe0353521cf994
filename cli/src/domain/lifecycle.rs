//! Box lifecycle phases and phase failure policies.

use serde::{Deserialize, Serialize};

/// Where a box is in its lifecycle.
///
/// The happy path is strictly ordered; the two failure phases are terminal
/// except for `Destroyed`, which every phase can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxPhase {
    Created,
    Up,
    SetupDone,
    Tested,
    Deployed,
    StartFailed,
    SetupFailed,
    Destroyed,
}

impl BoxPhase {
    fn rank(self) -> Option<u8> {
        match self {
            Self::Created => Some(0),
            Self::Up => Some(1),
            Self::SetupDone => Some(2),
            Self::Tested => Some(3),
            Self::Deployed => Some(4),
            Self::StartFailed | Self::SetupFailed | Self::Destroyed => None,
        }
    }

    /// Whether `next` is reachable from `self`.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Destroyed, _) => false,
            (_, Self::Destroyed) => true,
            (Self::Created | Self::Up, Self::StartFailed) => true,
            (Self::Up, Self::SetupFailed) => true,
            (current, next) => match (current.rank(), next.rank()) {
                (Some(a), Some(b)) => b > a,
                _ => false,
            },
        }
    }

    /// Whether remote commands may run in this phase.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Up | Self::SetupDone | Self::Tested | Self::Deployed)
    }
}

/// What the setup phase does when a command exits non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupFailurePolicy {
    /// Abort the phase and the job on the first failure.
    #[default]
    FailFast,
    /// Record the failure and keep going.
    Continue,
}

impl SetupFailurePolicy {
    pub const VALUES: &'static [&'static str] = &["fail_fast", "continue"];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FailFast => "fail_fast",
            Self::Continue => "continue",
        }
    }

    /// Parse a config value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fail_fast" => Some(Self::FailFast),
            "continue" => Some(Self::Continue),
            _ => None,
        }
    }
}
