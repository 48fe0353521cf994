//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `throwbox_common` — never
//! from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use throwbox_common::JobState;

use crate::domain::ThrowboxConfig;

// ── Value Types ───────────────────────────────────────────────────────────────

/// What to provision. Produced by a backend from a resolved template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineDescriptor {
    /// A Vagrant environment rooted at a directory holding a `Vagrantfile`.
    Vagrant { root: PathBuf },
    /// A cloud instance booted from an image.
    Instance {
        image_id: String,
        instance_type: String,
        security_group: String,
        key_name: String,
    },
}

/// Opaque identifier of a provisioned machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MachineHandle(pub String);

impl std::fmt::Display for MachineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse machine status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineStatus {
    Starting,
    Running,
    Error,
}

/// Where and as whom to open a remote shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Private key file authorizing `user`.
    pub identity_file: PathBuf,
}

/// Exit code and combined stdout/stderr of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutput {
    pub exit_code: i32,
    pub output: String,
}

impl RemoteOutput {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

// ── Machine Port Traits ───────────────────────────────────────────────────────

/// Hypervisor / cloud control plane: create, query, destroy machines.
#[allow(async_fn_in_trait)]
pub trait MachineProvider {
    /// Request a new machine. Returns once the provider accepted the request.
    async fn create(&self, descriptor: &MachineDescriptor) -> Result<MachineHandle>;
    /// Current status of the machine.
    async fn status(&self, handle: &MachineHandle) -> Result<MachineStatus>;
    /// SSH connection details of a running machine.
    async fn endpoint(&self, handle: &MachineHandle) -> Result<Endpoint>;
    /// Tear the machine down.
    async fn destroy(&self, handle: &MachineHandle) -> Result<()>;
}

/// Cloud account resources shared by or created for cloud boxes.
#[allow(async_fn_in_trait)]
pub trait CloudAccess {
    /// Image ids that can be provisioned.
    async fn list_images(&self) -> Result<Vec<String>>;
    /// Whether the named security group exists.
    async fn security_group_exists(&self, name: &str) -> Result<bool>;
    /// Create the named security group and open inbound SSH.
    async fn create_security_group(&self, name: &str) -> Result<()>;
    /// Create a key pair and return the private key material (PEM).
    async fn create_key_pair(&self, name: &str) -> Result<String>;
    /// Delete a key pair.
    async fn delete_key_pair(&self, name: &str) -> Result<()>;
}

// ── Remote Shell Ports ────────────────────────────────────────────────────────

/// Opens remote shell sessions.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    type Session: ShellSession;
    /// Open a session to `endpoint`.
    async fn open(&self, endpoint: &Endpoint) -> Result<Self::Session>;
}

/// One remote shell session on a provisioned machine.
#[allow(async_fn_in_trait)]
pub trait ShellSession {
    /// Run `command` and capture its exit code and combined output.
    async fn run(&self, command: &str) -> Result<RemoteOutput>;
    /// Recursively copy a local path to `remote` on the machine.
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;
}

// ── Git Port ──────────────────────────────────────────────────────────────────

/// Repository access.
#[allow(async_fn_in_trait)]
pub trait GitClient {
    /// Clone `url` into `dest`, authenticating with `private_key` if given.
    async fn clone_repo(&self, url: &str, private_key: Option<&Path>, dest: &Path) -> Result<()>;
    /// Hash of the HEAD commit of the repository at `repo`.
    async fn head_commit_sha(&self, repo: &Path) -> Result<String>;
    /// Message of the HEAD commit of the repository at `repo`.
    async fn head_commit_message(&self, repo: &Path) -> Result<String>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Receives coarse job state transitions. Sync trait — no async needed.
pub trait JobStateSink {
    fn report(&self, job_id: &str, state: JobState);
}

impl<T: JobStateSink + ?Sized> JobStateSink for &T {
    fn report(&self, job_id: &str, state: JobState) {
        (**self).report(job_id, state);
    }
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(&self, program: &str, args: &[&str], timeout: Duration)
    -> Result<Output>;
    /// Run a program with `dir` as its working directory.
    async fn run_in(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
}

// ── Config Port ───────────────────────────────────────────────────────────────

/// Abstracts configuration persistence.
pub trait ConfigStore {
    /// Load configuration, returning defaults when no file exists.
    fn load(&self) -> Result<ThrowboxConfig>;
    /// Persist configuration.
    fn save(&self, config: &ThrowboxConfig) -> Result<()>;
    /// Location of the configuration file.
    fn path(&self) -> Result<PathBuf>;
}

// ── Reference forwarding ──────────────────────────────────────────────────────
//
// Adapters are shared by every box a worker runs; boxes hold them by
// reference.

impl<T: MachineProvider> MachineProvider for &T {
    async fn create(&self, descriptor: &MachineDescriptor) -> Result<MachineHandle> {
        (**self).create(descriptor).await
    }
    async fn status(&self, handle: &MachineHandle) -> Result<MachineStatus> {
        (**self).status(handle).await
    }
    async fn endpoint(&self, handle: &MachineHandle) -> Result<Endpoint> {
        (**self).endpoint(handle).await
    }
    async fn destroy(&self, handle: &MachineHandle) -> Result<()> {
        (**self).destroy(handle).await
    }
}

impl<T: CloudAccess> CloudAccess for &T {
    async fn list_images(&self) -> Result<Vec<String>> {
        (**self).list_images().await
    }
    async fn security_group_exists(&self, name: &str) -> Result<bool> {
        (**self).security_group_exists(name).await
    }
    async fn create_security_group(&self, name: &str) -> Result<()> {
        (**self).create_security_group(name).await
    }
    async fn create_key_pair(&self, name: &str) -> Result<String> {
        (**self).create_key_pair(name).await
    }
    async fn delete_key_pair(&self, name: &str) -> Result<()> {
        (**self).delete_key_pair(name).await
    }
}

impl<T: RemoteShell> RemoteShell for &T {
    type Session = T::Session;
    async fn open(&self, endpoint: &Endpoint) -> Result<Self::Session> {
        (**self).open(endpoint).await
    }
}

impl<T: CommandRunner> CommandRunner for &T {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        (**self).run(program, args).await
    }
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        (**self).run_with_timeout(program, args, timeout).await
    }
    async fn run_in(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        (**self).run_in(dir, program, args, timeout).await
    }
}

impl<T: GitClient> GitClient for &T {
    async fn clone_repo(&self, url: &str, private_key: Option<&Path>, dest: &Path) -> Result<()> {
        (**self).clone_repo(url, private_key, dest).await
    }
    async fn head_commit_sha(&self, repo: &Path) -> Result<String> {
        (**self).head_commit_sha(repo).await
    }
    async fn head_commit_message(&self, repo: &Path) -> Result<String> {
        (**self).head_commit_message(repo).await
    }
}
