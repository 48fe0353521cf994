//! `throwbox pubkey` — print the public half of the repository key.
//!
//! Repository hosts need it registered as a deploy key before private
//! repositories can be cloned.

use anyhow::{Context, Result};
use std::process::ExitCode;

use crate::app::AppContext;
use crate::application::services::config_service;

/// Run the pubkey command.
///
/// # Errors
///
/// Returns an error if no public key is configured or it cannot be read.
pub fn run(app: &AppContext) -> Result<ExitCode> {
    let config = config_service::load_config(&app.config_store)?;
    let path = config.git.public_key.ok_or_else(|| {
        anyhow::anyhow!("no public key configured (set it with: throwbox config set git.public_key <path>)")
    })?;
    let key = std::fs::read_to_string(&path)
        .with_context(|| format!("cannot read public key {}", path.display()))?;
    app.renderer().render_value("git.public_key", key.trim())?;
    Ok(ExitCode::SUCCESS)
}
