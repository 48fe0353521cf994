//! JSON output helpers.
//!
//! Provides the error-object formatter used by all `--json` code paths when
//! a command fails, and the JSON renderer for command results.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use throwbox_common::{BackendKind, JobReport};

use crate::domain::ThrowboxConfig;

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

fn print_pretty(value: &impl Serialize) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("JSON serialization failed")?
    );
    Ok(())
}

/// Renders command results as pretty-printed JSON on stdout.
pub struct JsonRenderer;

impl JsonRenderer {
    /// Render the CLI version.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_version(version: &str) -> Result<()> {
        print_pretty(&serde_json::json!({ "version": version }))
    }

    /// Render every job report plus the overall outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_reports(reports: &[JobReport]) -> Result<()> {
        print_pretty(&serde_json::json!({
            "success": reports.iter().all(JobReport::success),
            "reports": reports,
        }))
    }

    /// Render the templates of one backend.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_templates(backend: BackendKind, templates: &[String]) -> Result<()> {
        print_pretty(&serde_json::json!({
            "backend": backend,
            "templates": templates,
        }))
    }

    /// Render the full configuration and where it lives.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_config(config: &ThrowboxConfig, path: &Path) -> Result<()> {
        print_pretty(&serde_json::json!({
            "path": path.display().to_string(),
            "config": config,
        }))
    }

    /// Render one `key = value` pair.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_value(key: &str, value: &str) -> Result<()> {
        print_pretty(&serde_json::json!({ "key": key, "value": value }))
    }
}
