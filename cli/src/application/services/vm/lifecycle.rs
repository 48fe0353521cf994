//! Box lifecycle: provisioning, script phases and teardown of one ephemeral
//! machine.
//!
//! Imports only from `crate::domain` and `crate::application`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::TempDir;
use throwbox_common::{BackendKind, JobRequest, TestResult};

use crate::application::ports::{Endpoint, GitClient, MachineHandle, RemoteShell, ShellSession};
use crate::application::services::session::run_recorded;
use crate::application::services::templates::Template;
use crate::domain::repo::{REMOTE_REPO_ROOT, REPO_ROOT, validate_commit_sha};
use crate::domain::{BoxError, BoxPhase, OutputLedger, Phase, SetupFailurePolicy};

/// Backend-specific half of a box.
///
/// Backends are stateless with respect to a single box: everything they need
/// to tear a box down is derivable from its handle and working directory.
#[allow(async_fn_in_trait)]
pub trait BoxBackend {
    fn kind(&self) -> BackendKind;
    /// Names accepted by [`BoxBackend::resolve`].
    async fn templates(&self) -> Result<Vec<String>, BoxError>;
    /// Validate `name` and materialize it for a box rooted at `workdir`.
    async fn resolve(&self, name: &str, workdir: &Path) -> Result<Template, BoxError>;
    /// Request the machine.
    async fn provision(&self, template: &Template, workdir: &Path) -> Result<MachineHandle, BoxError>;
    /// Wait for the machine to accept SSH and return where to reach it.
    async fn wait_ready(&self, handle: &MachineHandle, workdir: &Path)
    -> Result<Endpoint, BoxError>;
    /// Whether the local clone must be copied onto the machine.
    fn uploads_clone(&self) -> bool;
    /// Release the machine and any per-box resources. Best-effort.
    async fn teardown(&self, machine: Option<&MachineHandle>, workdir: &Path)
    -> anyhow::Result<()>;
}

impl<T: BoxBackend> BoxBackend for &T {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }
    async fn templates(&self) -> Result<Vec<String>, BoxError> {
        (**self).templates().await
    }
    async fn resolve(&self, name: &str, workdir: &Path) -> Result<Template, BoxError> {
        (**self).resolve(name, workdir).await
    }
    async fn provision(&self, template: &Template, workdir: &Path) -> Result<MachineHandle, BoxError> {
        (**self).provision(template, workdir).await
    }
    async fn wait_ready(
        &self,
        handle: &MachineHandle,
        workdir: &Path,
    ) -> Result<Endpoint, BoxError> {
        (**self).wait_ready(handle, workdir).await
    }
    fn uploads_clone(&self) -> bool {
        (**self).uploads_clone()
    }
    async fn teardown(
        &self,
        machine: Option<&MachineHandle>,
        workdir: &Path,
    ) -> anyhow::Result<()> {
        (**self).teardown(machine, workdir).await
    }
}

/// What a box runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoxSpec {
    pub setup: Vec<String>,
    pub test: Vec<String>,
    pub deploy: Vec<String>,
    pub repo_url: Option<String>,
    pub template: String,
    /// Key used to clone `repo_url`.
    pub private_key: Option<PathBuf>,
    pub setup_policy: SetupFailurePolicy,
}

impl BoxSpec {
    /// Build from a job request. `default_key` is used when the request
    /// names no private key.
    #[must_use]
    pub fn from_request(
        request: &JobRequest,
        default_key: Option<&Path>,
        setup_policy: SetupFailurePolicy,
    ) -> Self {
        Self {
            setup: request.setup.clone(),
            test: request.test.clone(),
            deploy: request.deploy.clone(),
            repo_url: request.repo_url().map(str::to_string),
            template: request.template.clone(),
            private_key: request
                .private_key
                .clone()
                .or_else(|| default_key.map(Path::to_path_buf)),
            setup_policy,
        }
    }
}

/// One ephemeral execution environment.
///
/// Owns a unique working directory for its whole life; the directory is
/// removed by [`ThrowBox::destroy`], or on drop if destroy never ran.
pub struct ThrowBox<B: BoxBackend, S: RemoteShell, G: GitClient> {
    backend: B,
    shell: S,
    git: G,
    spec: BoxSpec,
    workdir: Option<TempDir>,
    root: PathBuf,
    template: Template,
    phase: BoxPhase,
    machine: Option<MachineHandle>,
    session: Option<S::Session>,
    ledger: OutputLedger,
    results: Vec<TestResult>,
    cloned: bool,
    clone_uploaded: bool,
}

impl<B: BoxBackend, S: RemoteShell, G: GitClient> ThrowBox<B, S, G> {
    /// Create the working directory and resolve the template. No machine is
    /// provisioned.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::InvalidTemplate`] when the template is not in the
    /// backend's template set; the working directory is removed again.
    pub async fn create(backend: B, shell: S, git: G, spec: BoxSpec) -> Result<Self, BoxError> {
        let workdir = tempfile::Builder::new()
            .prefix("throwbox-")
            .tempdir()
            .context("failed to create box working directory")?;
        let root = workdir.path().to_path_buf();
        let template = backend.resolve(&spec.template, &root).await?;
        tracing::info!(
            backend = %backend.kind(),
            template = %spec.template,
            workdir = %root.display(),
            "box created"
        );
        Ok(Self {
            backend,
            shell,
            git,
            spec,
            workdir: Some(workdir),
            root,
            template,
            phase: BoxPhase::Created,
            machine: None,
            session: None,
            ledger: OutputLedger::new(),
            results: Vec::new(),
            cloned: false,
            clone_uploaded: false,
        })
    }

    /// Provision the machine, wait until it is reachable and open the remote
    /// session.
    ///
    /// # Errors
    ///
    /// Every failure is reported as [`BoxError::StartFailed`] and leaves the
    /// box in [`BoxPhase::StartFailed`].
    pub async fn up(&mut self) -> Result<(), BoxError> {
        match self.phase {
            BoxPhase::Created => {}
            BoxPhase::Destroyed => return Err(BoxError::Destroyed),
            other => {
                return Err(BoxError::start_failed(format!(
                    "box was already started ({other:?})"
                )));
            }
        }
        match self.start().await {
            Ok(()) => {
                self.phase = BoxPhase::Up;
                tracing::info!(workdir = %self.root.display(), "box is up");
                Ok(())
            }
            Err(e) => {
                self.phase = BoxPhase::StartFailed;
                tracing::warn!(workdir = %self.root.display(), error = %e, "box failed to start");
                Err(match e {
                    BoxError::StartFailed { .. } => e,
                    other => BoxError::start_failed(format!("{other:#}")),
                })
            }
        }
    }

    async fn start(&mut self) -> Result<(), BoxError> {
        let handle = self.backend.provision(&self.template, &self.root).await?;
        self.machine = Some(handle.clone());
        let endpoint = self.backend.wait_ready(&handle, &self.root).await?;
        tracing::debug!(host = %endpoint.host, port = endpoint.port, user = %endpoint.user, "opening session");
        self.session = Some(self.shell.open(&endpoint).await?);
        self.upload_clone().await
    }

    /// Clone the repository into `<workdir>/repo`. No-op without a URL or
    /// when already cloned. Backends that need it get the clone uploaded as
    /// soon as a session exists.
    ///
    /// # Errors
    ///
    /// Returns the git or upload failure unchanged.
    pub async fn clone_repo(&mut self) -> Result<(), BoxError> {
        if self.phase == BoxPhase::Destroyed {
            return Err(BoxError::Destroyed);
        }
        let Some(url) = self.spec.repo_url.as_deref() else {
            tracing::debug!("no repository url; skipping clone");
            return Ok(());
        };
        if !self.cloned {
            let dest = self.root.join(REPO_ROOT);
            tracing::info!(url, dest = %dest.display(), "cloning repository");
            self.git
                .clone_repo(url, self.spec.private_key.as_deref(), &dest)
                .await?;
            self.cloned = true;
        }
        self.upload_clone().await
    }

    async fn upload_clone(&mut self) -> Result<(), BoxError> {
        if !self.backend.uploads_clone() || !self.cloned || self.clone_uploaded {
            return Ok(());
        }
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        session
            .upload(&self.root.join(REPO_ROOT), REMOTE_REPO_ROOT)
            .await?;
        self.clone_uploaded = true;
        Ok(())
    }

    fn repo_dir(&self) -> Result<PathBuf, BoxError> {
        if self.cloned {
            Ok(self.root.join(REPO_ROOT))
        } else {
            Err(BoxError::NotCloned)
        }
    }

    /// Full hash of the cloned HEAD commit.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::NotCloned`] before [`ThrowBox::clone_repo`], or an
    /// error if git fails or returns something other than 40 hex chars.
    pub async fn top_commit_sha(&self) -> Result<String, BoxError> {
        let repo = self.repo_dir()?;
        let sha = self.git.head_commit_sha(&repo).await?.trim().to_string();
        validate_commit_sha(&sha)?;
        Ok(sha)
    }

    /// Message of the cloned HEAD commit.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::NotCloned`] before [`ThrowBox::clone_repo`].
    pub async fn top_commit_message(&self) -> Result<String, BoxError> {
        let repo = self.repo_dir()?;
        Ok(self.git.head_commit_message(&repo).await?.trim().to_string())
    }

    fn enter(&self, phase: Phase, next: BoxPhase) -> Result<(), BoxError> {
        if self.phase == BoxPhase::Destroyed {
            return Err(BoxError::Destroyed);
        }
        if !self.phase.is_running() || self.session.is_none() {
            return Err(BoxError::NotUp(phase));
        }
        if !self.phase.can_advance_to(next) {
            return Err(BoxError::PhaseOrder {
                phase,
                state: self.phase,
            });
        }
        Ok(())
    }

    /// Run the setup commands. Under [`SetupFailurePolicy::FailFast`] the
    /// first non-zero exit aborts the phase; under `Continue` every command
    /// runs. Returns whether every command succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`BoxError::SetupScriptFailed`] (the failed command is already
    /// in the ledger) or a transport error.
    pub async fn setup(&mut self) -> Result<bool, BoxError> {
        self.enter(Phase::Setup, BoxPhase::SetupDone)?;
        let Some(session) = self.session.as_ref() else {
            return Err(BoxError::NotUp(Phase::Setup));
        };
        self.ledger.open(Phase::Setup);
        let mut all_ok = true;
        for command in &self.spec.setup {
            let out = match run_recorded(session, &mut self.ledger, command).await {
                Ok(out) => out,
                Err(e) => {
                    self.phase = BoxPhase::SetupFailed;
                    return Err(e);
                }
            };
            if out.succeeded() {
                continue;
            }
            all_ok = false;
            let command = command.trim().to_string();
            match self.spec.setup_policy {
                SetupFailurePolicy::FailFast => {
                    tracing::warn!(command = %command, exit_code = out.exit_code, "setup command failed; aborting");
                    self.phase = BoxPhase::SetupFailed;
                    return Err(BoxError::SetupScriptFailed {
                        command,
                        exit_code: out.exit_code,
                    });
                }
                SetupFailurePolicy::Continue => {
                    tracing::warn!(command = %command, exit_code = out.exit_code, "setup command failed; continuing");
                }
            }
        }
        self.phase = BoxPhase::SetupDone;
        Ok(all_ok)
    }

    /// Run every test command, recording one [`TestResult`] each.
    ///
    /// # Errors
    ///
    /// Only transport errors; failing tests are data.
    pub async fn test(&mut self) -> Result<(), BoxError> {
        self.enter(Phase::Test, BoxPhase::Tested)?;
        let Some(session) = self.session.as_ref() else {
            return Err(BoxError::NotUp(Phase::Test));
        };
        self.ledger.open(Phase::Test);
        for command in &self.spec.test {
            let out = run_recorded(session, &mut self.ledger, command).await?;
            self.results
                .push(TestResult::new(command.trim(), out.exit_code));
        }
        self.phase = BoxPhase::Tested;
        Ok(())
    }

    /// Run every deploy command; failures are only recorded.
    ///
    /// # Errors
    ///
    /// Only transport errors.
    pub async fn deploy(&mut self) -> Result<(), BoxError> {
        self.enter(Phase::Deploy, BoxPhase::Deployed)?;
        let Some(session) = self.session.as_ref() else {
            return Err(BoxError::NotUp(Phase::Deploy));
        };
        self.ledger.open(Phase::Deploy);
        for command in &self.spec.deploy {
            let out = run_recorded(session, &mut self.ledger, command).await?;
            if !out.succeeded() {
                tracing::warn!(command = command.trim(), exit_code = out.exit_code, "deploy command failed");
            }
        }
        self.phase = BoxPhase::Deployed;
        Ok(())
    }

    /// Tear the machine down and remove the working directory. Safe to call
    /// any number of times from any phase; never fails.
    pub async fn destroy(&mut self) {
        if self.phase == BoxPhase::Destroyed {
            return;
        }
        self.session = None;
        let machine = self.machine.take();
        if let Err(e) = self.backend.teardown(machine.as_ref(), &self.root).await {
            tracing::error!(
                workdir = %self.root.display(),
                error = %format!("{e:#}"),
                "box teardown failed"
            );
        }
        if let Some(dir) = self.workdir.take()
            && let Err(e) = dir.close()
        {
            tracing::warn!(workdir = %self.root.display(), error = %e, "failed to remove box working directory");
        }
        self.phase = BoxPhase::Destroyed;
        tracing::info!(workdir = %self.root.display(), "box destroyed");
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn phase(&self) -> BoxPhase {
        self.phase
    }

    /// Working directory; no longer exists once destroyed.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn template(&self) -> &Template {
        &self.template
    }

    #[must_use]
    pub fn machine(&self) -> Option<&MachineHandle> {
        self.machine.as_ref()
    }

    #[must_use]
    pub fn ledger(&self) -> &OutputLedger {
        &self.ledger
    }

    #[must_use]
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    #[must_use]
    pub fn is_cloned(&self) -> bool {
        self.cloned
    }
}

impl<B: BoxBackend, S: RemoteShell, G: GitClient> Drop for ThrowBox<B, S, G> {
    fn drop(&mut self) {
        if let Some(machine) = &self.machine {
            tracing::warn!(machine = %machine, "box dropped without destroy; machine may still be running");
        }
    }
}
