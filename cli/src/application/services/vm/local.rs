//! Local backend: one Vagrant environment per box.
//!
//! The hypervisor does not tolerate concurrent `vagrant up` calls, so every
//! local backend created from the same [`ProvisionLock`] serializes the
//! provisioning call. Readiness polling runs outside the lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use throwbox_common::BackendKind;
use tokio::sync::{Mutex, MutexGuard};

use crate::application::ports::{Endpoint, MachineDescriptor, MachineHandle, MachineProvider};
use crate::application::services::templates::{self, Template};
use crate::application::services::vm::lifecycle::BoxBackend;
use crate::application::services::vm::readiness::wait_until_running;
use crate::domain::BoxError;
use crate::domain::config::ReadinessPolicy;

/// Shared lock guarding one provisioning resource. Clones share the lock.
#[derive(Debug, Clone, Default)]
pub struct ProvisionLock(Arc<Mutex<()>>);

impl ProvisionLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

/// Vagrant-backed boxes.
pub struct LocalBackend<P> {
    provider: P,
    template_dir: Option<PathBuf>,
    lock: ProvisionLock,
    readiness: ReadinessPolicy,
}

impl<P: MachineProvider> LocalBackend<P> {
    pub fn new(
        provider: P,
        template_dir: Option<PathBuf>,
        lock: ProvisionLock,
        readiness: ReadinessPolicy,
    ) -> Self {
        Self {
            provider,
            template_dir,
            lock,
            readiness,
        }
    }
}

impl<P: MachineProvider> BoxBackend for LocalBackend<P> {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn templates(&self) -> Result<Vec<String>, BoxError> {
        match &self.template_dir {
            Some(dir) => templates::list_local(dir),
            None => Ok(Vec::new()),
        }
    }

    async fn resolve(&self, name: &str, workdir: &Path) -> Result<Template, BoxError> {
        templates::resolve_local(self.template_dir.as_deref(), name, workdir)
    }

    async fn provision(&self, template: &Template, workdir: &Path) -> Result<MachineHandle, BoxError> {
        let Template::Vagrantfile(_) = template else {
            return Err(BoxError::start_failed("local boxes need a Vagrantfile template"));
        };
        let descriptor = MachineDescriptor::Vagrant {
            root: workdir.to_path_buf(),
        };
        let created = {
            let _guard = self.lock.acquire().await;
            tracing::info!(workdir = %workdir.display(), "provisioning local machine");
            self.provider.create(&descriptor).await
        };
        match created {
            Ok(handle) => Ok(handle),
            Err(e) => {
                // A failed `vagrant up` can leave a half-created machine.
                let partial = MachineHandle(workdir.display().to_string());
                if let Err(cleanup) = self.provider.destroy(&partial).await {
                    tracing::debug!(error = %cleanup, "no partial machine to clean up");
                }
                Err(BoxError::start_failed(format!("{e:#}")))
            }
        }
    }

    async fn wait_ready(&self, handle: &MachineHandle, _workdir: &Path) -> Result<Endpoint, BoxError> {
        wait_until_running(&self.provider, handle, self.readiness).await?;
        self.provider
            .endpoint(handle)
            .await
            .map_err(|e| BoxError::start_failed(format!("{e:#}")))
    }

    fn uploads_clone(&self) -> bool {
        // The working directory is synced into the machine.
        false
    }

    async fn teardown(&self, machine: Option<&MachineHandle>, _workdir: &Path) -> anyhow::Result<()> {
        match machine {
            Some(handle) => self.provider.destroy(handle).await,
            None => Ok(()),
        }
    }
}
