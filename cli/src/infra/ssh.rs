//! `RemoteShell` adapter over the OpenSSH client (`ssh` / `scp`).
//!
//! Machines are throwaway, so host keys are neither checked nor stored.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, Endpoint, RemoteOutput, RemoteShell, ShellSession};
use crate::infra::command_runner::{PROVISION_TIMEOUT, REMOTE_COMMAND_TIMEOUT, ensure_success};

/// Prefix of the trailer line carrying the remote command's exit status.
const EXIT_MARKER: &str = "__THROWBOX_RC=";

/// Connection attempts made by [`RemoteShell::open`] before giving up.
pub const CONNECT_ATTEMPTS: u32 = 200;
/// Pause between connection attempts.
pub const CONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Quote `s` for a POSIX shell.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Remote command line that runs `command` under `sh` with stderr folded
/// into stdout, followed by a trailer line holding its exit status.
///
/// `ssh` reports its own failures as exit 255, which a remote command may
/// return too; the trailer keeps the two apart.
#[must_use]
pub fn remote_command(command: &str) -> String {
    format!(
        "sh -c {} 2>&1; printf '\\n{EXIT_MARKER}%d\\n' $?",
        shell_quote(command)
    )
}

/// Split the exit-status trailer off `stdout`.
///
/// Returns the command output without the trailer and the exit code, or
/// `None` when no trailer is present.
#[must_use]
pub fn split_exit_status(stdout: &str) -> Option<(&str, i32)> {
    let start = stdout.rfind(&format!("\n{EXIT_MARKER}"))?;
    let code = stdout[start + 1 + EXIT_MARKER.len()..]
        .trim_end()
        .parse()
        .ok()?;
    Some((&stdout[..start], code))
}

fn common_options(endpoint: &Endpoint) -> Vec<String> {
    let mut opts = vec!["-i".to_string(), endpoint.identity_file.display().to_string()];
    for opt in [
        "BatchMode=yes",
        "StrictHostKeyChecking=no",
        "UserKnownHostsFile=/dev/null",
        "IdentitiesOnly=yes",
        "LogLevel=ERROR",
        "ConnectTimeout=30",
    ] {
        opts.push("-o".to_string());
        opts.push(opt.to_string());
    }
    opts
}

/// OpenSSH client.
#[derive(Debug, Clone)]
pub struct OpenSsh<R> {
    runner: R,
    connect_attempts: u32,
    connect_interval: Duration,
}

impl<R: CommandRunner + Clone> OpenSsh<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            connect_attempts: CONNECT_ATTEMPTS,
            connect_interval: CONNECT_INTERVAL,
        }
    }

    /// Override how patiently [`RemoteShell::open`] waits for sshd.
    #[must_use]
    pub fn with_connect_retry(mut self, attempts: u32, interval: Duration) -> Self {
        self.connect_attempts = attempts.max(1);
        self.connect_interval = interval;
        self
    }
}

impl<R: CommandRunner + Clone> RemoteShell for OpenSsh<R> {
    type Session = SshSession<R>;

    async fn open(&self, endpoint: &Endpoint) -> Result<SshSession<R>> {
        let session = SshSession {
            runner: self.runner.clone(),
            endpoint: endpoint.clone(),
        };
        let mut last_error = None;
        for attempt in 1..=self.connect_attempts {
            match session.run("true").await {
                Ok(out) if out.succeeded() => return Ok(session),
                Ok(out) => {
                    anyhow::bail!("ssh probe on {} exited with {}", endpoint.host, out.exit_code)
                }
                Err(e) => {
                    tracing::debug!(host = %endpoint.host, attempt, error = %e, "ssh not reachable yet");
                    last_error = Some(e);
                }
            }
            if attempt < self.connect_attempts {
                tokio::time::sleep(self.connect_interval).await;
            }
        }
        let error = last_error.unwrap_or_else(|| anyhow::anyhow!("no connection attempt made"));
        Err(error.context(format!(
            "cannot reach {}@{}:{} over ssh",
            endpoint.user, endpoint.host, endpoint.port
        )))
    }
}

/// One remote machine reached through `ssh`.
#[derive(Debug, Clone)]
pub struct SshSession<R> {
    runner: R,
    endpoint: Endpoint,
}

impl<R: CommandRunner> ShellSession for SshSession<R> {
    async fn run(&self, command: &str) -> Result<RemoteOutput> {
        let mut args = common_options(&self.endpoint);
        args.push("-p".to_string());
        args.push(self.endpoint.port.to_string());
        args.push(format!("{}@{}", self.endpoint.user, self.endpoint.host));
        args.push(remote_command(command));
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = self
            .runner
            .run_with_timeout("ssh", &argv, REMOTE_COMMAND_TIMEOUT)
            .await
            .context("failed to run ssh")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some((text, exit_code)) = split_exit_status(&stdout) else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "ssh to {} failed ({}): {}",
                self.endpoint.host,
                output.status,
                stderr.trim()
            );
        };
        Ok(RemoteOutput {
            exit_code,
            output: text.to_string(),
        })
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let mut args = vec!["-r".to_string()];
        args.extend(common_options(&self.endpoint));
        args.push("-P".to_string());
        args.push(self.endpoint.port.to_string());
        args.push(local.display().to_string());
        args.push(format!(
            "{}@{}:{remote}",
            self.endpoint.user, self.endpoint.host
        ));
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self
            .runner
            .run_with_timeout("scp", &argv, PROVISION_TIMEOUT)
            .await
            .context("failed to run scp")?;
        ensure_success(&output, "scp")
    }
}
