//! Cloud backend: one dedicated instance per box.
//!
//! Every instance joins a shared security group that only opens SSH. The
//! group is created on first use under its own lock so concurrent boxes do
//! not race to create it. Each box gets its own key pair, named after its
//! working directory and stored inside it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};
use throwbox_common::BackendKind;

use crate::application::ports::{
    CloudAccess, Endpoint, MachineDescriptor, MachineHandle, MachineProvider,
};
use crate::application::services::templates::{self, Template};
use crate::application::services::vm::lifecycle::BoxBackend;
use crate::application::services::vm::local::ProvisionLock;
use crate::application::services::vm::readiness::wait_until_running;
use crate::domain::BoxError;
use crate::domain::config::{CloudConfig, ReadinessPolicy};

const KEY_DIR: &str = "key";

fn write_key(path: &Path, pem: &str) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }
    std::fs::write(path, pem).with_context(|| format!("cannot write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("cannot set permissions on {}", path.display()))?;
    }
    Ok(())
}

/// Key pair name for the box rooted at `workdir`.
#[must_use]
pub fn key_name(workdir: &Path) -> String {
    let digest = Sha256::digest(workdir.as_os_str().as_encoded_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("throwbox-{hex}")
}

/// Where the private key of the box rooted at `workdir` is stored.
#[must_use]
pub fn key_path(workdir: &Path) -> PathBuf {
    workdir
        .join(KEY_DIR)
        .join(format!("{}.pem", key_name(workdir)))
}

/// EC2-backed boxes.
pub struct CloudBackend<A> {
    cloud: A,
    security_group: String,
    instance_type: String,
    ssh_user: String,
    group_lock: ProvisionLock,
    readiness: ReadinessPolicy,
}

impl<A: MachineProvider + CloudAccess> CloudBackend<A> {
    pub fn new(cloud: A, config: &CloudConfig, group_lock: ProvisionLock) -> Self {
        Self {
            cloud,
            security_group: config.security_group.clone(),
            instance_type: config.instance_type.clone(),
            ssh_user: config.ssh_user.clone(),
            group_lock,
            readiness: config.readiness(),
        }
    }

    /// Override the readiness policy.
    #[must_use]
    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Create the shared security group unless it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the group cannot be queried or created.
    pub async fn ensure_security_group(&self) -> anyhow::Result<()> {
        let _guard = self.group_lock.acquire().await;
        if self.cloud.security_group_exists(&self.security_group).await? {
            return Ok(());
        }
        tracing::info!(group = %self.security_group, "creating security group");
        self.cloud
            .create_security_group(&self.security_group)
            .await
            .with_context(|| format!("failed to create security group {}", self.security_group))
    }

    async fn create_key(&self, workdir: &Path) -> anyhow::Result<String> {
        let name = key_name(workdir);
        let pem = self.cloud.create_key_pair(&name).await?;
        if let Err(e) = write_key(&key_path(workdir), &pem) {
            // Teardown only finds key pairs through the stored file.
            if let Err(cleanup) = self.cloud.delete_key_pair(&name).await {
                tracing::warn!(key = %name, error = %cleanup, "failed to delete key pair");
            }
            return Err(e);
        }
        Ok(name)
    }

    async fn launch(&self, image_id: &str, workdir: &Path) -> anyhow::Result<MachineHandle> {
        self.ensure_security_group().await?;
        let key_name = self.create_key(workdir).await?;
        let descriptor = MachineDescriptor::Instance {
            image_id: image_id.to_string(),
            instance_type: self.instance_type.clone(),
            security_group: self.security_group.clone(),
            key_name,
        };
        tracing::info!(image = image_id, instance_type = %self.instance_type, "launching instance");
        self.cloud.create(&descriptor).await
    }
}

impl<A: MachineProvider + CloudAccess> BoxBackend for CloudBackend<A> {
    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    async fn templates(&self) -> Result<Vec<String>, BoxError> {
        templates::list_cloud(&self.cloud).await
    }

    async fn resolve(&self, name: &str, _workdir: &Path) -> Result<Template, BoxError> {
        templates::resolve_cloud(&self.cloud, name).await
    }

    async fn provision(&self, template: &Template, workdir: &Path) -> Result<MachineHandle, BoxError> {
        let Template::Image(image_id) = template else {
            return Err(BoxError::start_failed("cloud boxes need an image template"));
        };
        self.launch(image_id, workdir)
            .await
            .map_err(|e| BoxError::start_failed(format!("{e:#}")))
    }

    async fn wait_ready(&self, handle: &MachineHandle, workdir: &Path) -> Result<Endpoint, BoxError> {
        wait_until_running(&self.cloud, handle, self.readiness).await?;
        let endpoint = self
            .cloud
            .endpoint(handle)
            .await
            .map_err(|e| BoxError::start_failed(format!("{e:#}")))?;
        Ok(Endpoint {
            user: self.ssh_user.clone(),
            identity_file: key_path(workdir),
            ..endpoint
        })
    }

    fn uploads_clone(&self) -> bool {
        true
    }

    async fn teardown(&self, machine: Option<&MachineHandle>, workdir: &Path) -> anyhow::Result<()> {
        let mut failures = Vec::new();
        if let Some(handle) = machine
            && let Err(e) = self.cloud.destroy(handle).await
        {
            failures.push(format!("terminate {handle}: {e:#}"));
        }
        if key_path(workdir).exists() {
            let name = key_name(workdir);
            if let Err(e) = self.cloud.delete_key_pair(&name).await {
                failures.push(format!("delete key pair {name}: {e:#}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(failures.join("; "))
        }
    }
}
