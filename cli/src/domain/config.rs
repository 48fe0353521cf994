//! Domain types and validators for throwbox configuration.
//!
//! Pure functions only — no I/O, no async, no filesystem access.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::lifecycle::SetupFailurePolicy;

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "local.template_dir",
    "local.poll_interval_secs",
    "local.max_status_attempts",
    "cloud.security_group",
    "cloud.instance_type",
    "cloud.ssh_user",
    "cloud.region",
    "cloud.image_owners",
    "cloud.poll_interval_secs",
    "cloud.max_status_attempts",
    "cloud.settle_secs",
    "git.private_key",
    "git.public_key",
    "setup_failure",
];

const NUMERIC_KEYS: &[&str] = &[
    "local.poll_interval_secs",
    "local.max_status_attempts",
    "cloud.poll_interval_secs",
    "cloud.max_status_attempts",
    "cloud.settle_secs",
];

/// Owners whose AMIs are offered as cloud templates: the account itself,
/// Amazon, and Canonical's Ubuntu images.
pub const DEFAULT_IMAGE_OWNERS: &[&str] = &["self", "amazon", "099720109477"];

const ATTEMPT_KEYS: &[&str] = &["local.max_status_attempts", "cloud.max_status_attempts"];

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.throwbox/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ThrowboxConfig {
    pub local: LocalConfig,
    pub cloud: CloudConfig,
    pub git: GitConfig,
    pub setup_failure: SetupFailurePolicy,
}

/// Vagrant backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalConfig {
    /// Directory holding one Vagrantfile per template; file names are the
    /// template names.
    pub template_dir: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub max_status_attempts: u32,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            template_dir: Some(PathBuf::from("/tmp/vagrant")),
            poll_interval_secs: 1,
            max_status_attempts: 400,
        }
    }
}

impl LocalConfig {
    #[must_use]
    pub fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_status_attempts,
            settle: Duration::ZERO,
        }
    }
}

/// EC2 backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CloudConfig {
    /// Shared security group opened for SSH, created on first use.
    pub security_group: String,
    pub instance_type: String,
    pub ssh_user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Accounts whose images may be used as templates (`--owners`).
    pub image_owners: Vec<String>,
    pub poll_interval_secs: u64,
    pub max_status_attempts: u32,
    /// Extra wait after the instance reports running, before SSH is assumed
    /// reachable.
    pub settle_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            security_group: "throwbox".to_string(),
            instance_type: "t1.micro".to_string(),
            ssh_user: "ubuntu".to_string(),
            region: None,
            image_owners: DEFAULT_IMAGE_OWNERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            poll_interval_secs: 5,
            max_status_attempts: 120,
            settle_secs: 30,
        }
    }
}

impl CloudConfig {
    #[must_use]
    pub fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_status_attempts,
            settle: Duration::from_secs(self.settle_secs),
        }
    }
}

/// Keys used to clone repositories.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PathBuf>,
}

/// Bounded status polling parameters for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Fixed wait after the machine first reports running.
    pub settle: Duration,
}

impl ReadinessPolicy {
    /// No waiting at all; used by tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            interval: Duration::ZERO,
            max_attempts,
            settle: Duration::ZERO,
        }
    }
}

impl ThrowboxConfig {
    /// Current value of a whitelisted key, rendered as text. Unset optional
    /// values render as an empty string.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown.
    pub fn get(&self, key: &str) -> Result<String> {
        validate_config_key(key)?;
        let path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        Ok(match key {
            "local.template_dir" => path(&self.local.template_dir),
            "local.poll_interval_secs" => self.local.poll_interval_secs.to_string(),
            "local.max_status_attempts" => self.local.max_status_attempts.to_string(),
            "cloud.security_group" => self.cloud.security_group.clone(),
            "cloud.instance_type" => self.cloud.instance_type.clone(),
            "cloud.ssh_user" => self.cloud.ssh_user.clone(),
            "cloud.region" => self.cloud.region.clone().unwrap_or_default(),
            "cloud.image_owners" => self.cloud.image_owners.join(","),
            "cloud.poll_interval_secs" => self.cloud.poll_interval_secs.to_string(),
            "cloud.max_status_attempts" => self.cloud.max_status_attempts.to_string(),
            "cloud.settle_secs" => self.cloud.settle_secs.to_string(),
            "git.private_key" => path(&self.git.private_key),
            "git.public_key" => path(&self.git.public_key),
            _ => self.setup_failure.as_str().to_string(),
        })
    }

    /// Validate and apply `key = value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value invalid for it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_config_key(key)?;
        validate_config_value(key, value)?;
        let number = || value.parse::<u64>().unwrap_or_default();
        let attempts = || value.parse::<u32>().unwrap_or_default();
        match key {
            "local.template_dir" => self.local.template_dir = Some(PathBuf::from(value)),
            "local.poll_interval_secs" => self.local.poll_interval_secs = number(),
            "local.max_status_attempts" => self.local.max_status_attempts = attempts(),
            "cloud.security_group" => self.cloud.security_group = value.to_string(),
            "cloud.instance_type" => self.cloud.instance_type = value.to_string(),
            "cloud.ssh_user" => self.cloud.ssh_user = value.to_string(),
            "cloud.region" => self.cloud.region = Some(value.to_string()),
            "cloud.image_owners" => self.cloud.image_owners = parse_owner_list(value),
            "cloud.poll_interval_secs" => self.cloud.poll_interval_secs = number(),
            "cloud.max_status_attempts" => self.cloud.max_status_attempts = attempts(),
            "cloud.settle_secs" => self.cloud.settle_secs = number(),
            "git.private_key" => self.git.private_key = Some(PathBuf::from(value)),
            "git.public_key" => self.git.public_key = Some(PathBuf::from(value)),
            _ => {
                self.setup_failure =
                    SetupFailurePolicy::parse(value).unwrap_or(self.setup_failure);
            }
        }
        Ok(())
    }
}

/// Split a comma-separated owner list, dropping blanks.
#[must_use]
pub fn parse_owner_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(ToString::to_string)
        .collect()
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a configuration key against the whitelist.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if !VALID_CONFIG_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey {
            key: key.to_string(),
            valid: VALID_CONFIG_KEYS.join(", "),
        }
        .into());
    }
    Ok(())
}

/// Validates a configuration value for the given key.
///
/// # Errors
///
/// Returns an error if the value is not valid for the key.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    let invalid = |valid: &str| -> anyhow::Error {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            valid: valid.to_string(),
        }
        .into()
    };

    if key == "setup_failure" {
        if SetupFailurePolicy::parse(value).is_none() {
            return Err(invalid(&SetupFailurePolicy::VALUES.join(", ")));
        }
    } else if key == "cloud.image_owners" {
        let owners = parse_owner_list(value);
        if owners.is_empty() || owners.iter().any(|o| o.contains(char::is_whitespace)) {
            return Err(invalid("a comma-separated list of owners, e.g. self,amazon"));
        }
    } else if ATTEMPT_KEYS.contains(&key) {
        match value.parse::<u32>() {
            Ok(n) if n > 0 => {}
            _ => return Err(invalid("a positive integer")),
        }
    } else if NUMERIC_KEYS.contains(&key) {
        if value.parse::<u64>().is_err() {
            return Err(invalid("a non-negative integer (seconds)"));
        }
    } else if value.trim().is_empty() {
        return Err(invalid("a non-empty string"));
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
