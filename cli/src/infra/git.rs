//! `GitClient` adapter over the `git` binary.

use std::path::Path;

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, GitClient};
use crate::infra::command_runner::{DEFAULT_CMD_TIMEOUT, PROVISION_TIMEOUT, ensure_success};

/// `core.sshCommand` value that authenticates with `key` only.
#[must_use]
pub fn ssh_command(key: &Path) -> String {
    format!(
        "core.sshCommand=ssh -i {} -o IdentitiesOnly=yes -o BatchMode=yes -o StrictHostKeyChecking=accept-new",
        crate::infra::ssh::shell_quote(&key.display().to_string())
    )
}

/// Git driven through its command-line interface.
pub struct GitCli<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> GitCli<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn git_in(&self, repo: &Path, args: &[&str]) -> Result<String> {
        let output = self
            .runner
            .run_in(repo, "git", args, DEFAULT_CMD_TIMEOUT)
            .await
            .context("failed to run git")?;
        ensure_success(&output, &format!("git {}", args.first().unwrap_or(&"")))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl<R: CommandRunner> GitClient for GitCli<R> {
    async fn clone_repo(&self, url: &str, private_key: Option<&Path>, dest: &Path) -> Result<()> {
        let dest_str = dest.display().to_string();
        let config = private_key.map(ssh_command);
        let mut args = Vec::new();
        if let Some(config) = &config {
            args.extend_from_slice(&["-c", config.as_str()]);
        }
        args.extend_from_slice(&["clone", "--quiet", url, dest_str.as_str()]);
        let output = self
            .runner
            .run_with_timeout("git", &args, PROVISION_TIMEOUT)
            .await
            .with_context(|| format!("failed to clone {url}"))?;
        ensure_success(&output, &format!("git clone {url}"))
    }

    async fn head_commit_sha(&self, repo: &Path) -> Result<String> {
        self.git_in(repo, &["rev-list", "-n", "1", "HEAD"]).await
    }

    async fn head_commit_message(&self, repo: &Path) -> Result<String> {
        self.git_in(repo, &["log", "-n", "1", "HEAD", "--pretty=%B"])
            .await
    }
}
