//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! Transport failures from adapters are carried as `anyhow::Error` so they
//! surface unchanged.

use thiserror::Error;
use throwbox_common::{BackendKind, TransitionError};

use crate::domain::ledger::Phase;
use crate::domain::lifecycle::BoxPhase;

// ── Box errors ────────────────────────────────────────────────────────────────

/// Errors raised by the box lifecycle.
#[derive(Debug, Error)]
pub enum BoxError {
    #[error("Invalid template '{name}' for the {backend} backend")]
    InvalidTemplate { name: String, backend: BackendKind },

    #[error("Machine failed to start: {reason}")]
    StartFailed { reason: String },

    #[error("Setup script failed: '{command}' exited with {exit_code}")]
    SetupScriptFailed { command: String, exit_code: i32 },

    #[error("Box is not up; cannot run {0} commands")]
    NotUp(Phase),

    #[error("Cannot run {phase} commands once the box is {state:?}")]
    PhaseOrder { phase: Phase, state: BoxPhase },

    #[error("Repository has not been cloned")]
    NotCloned,

    #[error("Box has already been destroyed")]
    Destroyed,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl BoxError {
    /// Shorthand for a start failure with a formatted reason.
    pub fn start_failed(reason: impl std::fmt::Display) -> Self {
        Self::StartFailed {
            reason: reason.to_string(),
        }
    }

    /// Whether the error is a template validation failure.
    #[must_use]
    pub fn is_invalid_template(&self) -> bool {
        matches!(self, Self::InvalidTemplate { .. })
    }
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration key/value validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value}\n\nValid values: {valid}")]
    InvalidValue {
        key: String,
        value: String,
        valid: String,
    },
}
