//! Template resolution for both backends.
//!
//! A local template is a Vagrantfile stored under the configured template
//! directory, named after the template. A cloud template is an image id the
//! account can launch.

use std::path::{Path, PathBuf};

use anyhow::Context;
use throwbox_common::BackendKind;

use crate::application::ports::CloudAccess;
use crate::domain::BoxError;

/// File name a local template is copied to inside the box working directory.
pub const VAGRANTFILE: &str = "Vagrantfile";

/// A template validated against its backend's template set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// Vagrantfile copied into the box working directory.
    Vagrantfile(PathBuf),
    /// Cloud image id.
    Image(String),
}

fn invalid(name: &str, backend: BackendKind) -> BoxError {
    BoxError::InvalidTemplate {
        name: name.to_string(),
        backend,
    }
}

/// Names of the templates in `dir`, sorted.
///
/// # Errors
///
/// Returns a transport error when the directory cannot be read.
pub fn list_local(dir: &Path) -> Result<Vec<String>, BoxError> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read template directory {}", dir.display()))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Validate `name` against the local template set and copy it into
/// `workdir` as the box's `Vagrantfile`.
///
/// # Errors
///
/// Returns [`BoxError::InvalidTemplate`] when no template directory is
/// configured, it cannot be listed, or `name` is not in it.
pub fn resolve_local(
    dir: Option<&Path>,
    name: &str,
    workdir: &Path,
) -> Result<Template, BoxError> {
    let Some(dir) = dir else {
        tracing::warn!(template = name, "no local template directory configured");
        return Err(invalid(name, BackendKind::Local));
    };
    let names = match list_local(dir) {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(template = name, error = %e, "cannot list local templates");
            return Err(invalid(name, BackendKind::Local));
        }
    };
    if !names.iter().any(|n| n == name) {
        return Err(invalid(name, BackendKind::Local));
    }
    let dest = workdir.join(VAGRANTFILE);
    std::fs::copy(dir.join(name), &dest)
        .with_context(|| format!("failed to copy template {name} to {}", dest.display()))?;
    Ok(Template::Vagrantfile(dest))
}

/// Image ids the cloud account can launch.
///
/// # Errors
///
/// Returns an error if the image listing fails.
pub async fn list_cloud(cloud: &impl CloudAccess) -> Result<Vec<String>, BoxError> {
    let mut images = cloud.list_images().await?;
    images.sort();
    Ok(images)
}

/// Validate `name` against the cloud image set and return it unchanged.
///
/// # Errors
///
/// Returns [`BoxError::InvalidTemplate`] when the image is unknown or the
/// listing fails.
pub async fn resolve_cloud(cloud: &impl CloudAccess, name: &str) -> Result<Template, BoxError> {
    let images = match cloud.list_images().await {
        Ok(images) => images,
        Err(e) => {
            tracing::warn!(template = name, error = %e, "cannot list cloud images");
            return Err(invalid(name, BackendKind::Cloud));
        }
    };
    if images.iter().any(|i| i == name) {
        Ok(Template::Image(name.to_string()))
    } else {
        Err(invalid(name, BackendKind::Cloud))
    }
}
