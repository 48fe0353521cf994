//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod error;
pub mod job;
pub mod ledger;
pub mod lifecycle;
pub mod repo;

pub use config::{
    ReadinessPolicy, ThrowboxConfig, VALID_CONFIG_KEYS, validate_config_key, validate_config_value,
};
pub use error::{BoxError, ConfigError};
pub use job::generate_job_id;
pub use ledger::{OutputLedger, Phase, normalize_output};
pub use lifecycle::{BoxPhase, SetupFailurePolicy};
