//! `MachineProvider` and `CloudAccess` adapter driving `aws ec2`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::application::ports::{
    CloudAccess, CommandRunner, Endpoint, MachineDescriptor, MachineHandle, MachineProvider,
    MachineStatus,
};
use crate::domain::config::DEFAULT_IMAGE_OWNERS;
use crate::infra::command_runner::{DEFAULT_CMD_TIMEOUT, ensure_success};

const GROUP_NOT_FOUND: &str = "InvalidGroup.NotFound";
/// Returned by `describe-instances` until a fresh instance becomes visible.
const INSTANCE_NOT_FOUND: &str = "InvalidInstanceID.NotFound";

// ── Response shapes ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeImages {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Image {
    image_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyPair {
    key_material: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstances {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstances {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    #[serde(default)]
    state: Option<InstanceState>,
    #[serde(default)]
    public_dns_name: Option<String>,
    #[serde(default)]
    public_ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceState {
    name: String,
}

/// Map an EC2 instance state name onto the coarse status.
#[must_use]
pub fn status_from_state(name: &str) -> MachineStatus {
    match name {
        "running" => MachineStatus::Running,
        "pending" => MachineStatus::Starting,
        _ => MachineStatus::Error,
    }
}

// ── Adapter ──────────────────────────────────────────────────────────────────

/// EC2 driven through the AWS command-line interface.
pub struct AwsCli<R: CommandRunner> {
    runner: R,
    region: Option<String>,
    image_owners: Vec<String>,
}

impl<R: CommandRunner> AwsCli<R> {
    pub fn new(runner: R, region: Option<String>) -> Self {
        Self {
            runner,
            region,
            image_owners: DEFAULT_IMAGE_OWNERS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Restrict template images to those owned by `owners`.
    #[must_use]
    pub fn with_image_owners(mut self, owners: Vec<String>) -> Self {
        if !owners.is_empty() {
            self.image_owners = owners;
        }
        self
    }

    async fn ec2_raw(&self, args: &[&str]) -> Result<std::process::Output> {
        let mut argv = vec!["ec2"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["--output", "json"]);
        if let Some(region) = &self.region {
            argv.extend_from_slice(&["--region", region.as_str()]);
        }
        self.runner
            .run_with_timeout("aws", &argv, DEFAULT_CMD_TIMEOUT)
            .await
            .with_context(|| format!("failed to run aws ec2 {}", args.first().unwrap_or(&"")))
    }

    async fn ec2(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = self.ec2_raw(args).await?;
        ensure_success(&output, &format!("aws ec2 {}", args.first().unwrap_or(&"")))?;
        Ok(output.stdout)
    }

    /// Describe one instance; `None` while EC2 does not know it yet.
    async fn try_describe(&self, handle: &MachineHandle) -> Result<Option<Instance>> {
        let output = self
            .ec2_raw(&["describe-instances", "--instance-ids", &handle.0])
            .await?;
        if !output.status.success()
            && String::from_utf8_lossy(&output.stderr).contains(INSTANCE_NOT_FOUND)
        {
            return Ok(None);
        }
        ensure_success(&output, "aws ec2 describe-instances")?;
        let parsed: DescribeInstances = serde_json::from_slice(&output.stdout)
            .context("invalid JSON from describe-instances")?;
        Ok(parsed
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .find(|i| i.instance_id == handle.0))
    }

    async fn describe(&self, handle: &MachineHandle) -> Result<Instance> {
        self.try_describe(handle)
            .await?
            .ok_or_else(|| anyhow::anyhow!("instance {handle} not found"))
    }
}

impl<R: CommandRunner> MachineProvider for AwsCli<R> {
    async fn create(&self, descriptor: &MachineDescriptor) -> Result<MachineHandle> {
        let MachineDescriptor::Instance {
            image_id,
            instance_type,
            security_group,
            key_name,
        } = descriptor
        else {
            anyhow::bail!("ec2 cannot provision {descriptor:?}");
        };
        let stdout = self
            .ec2(&[
                "run-instances",
                "--image-id",
                image_id,
                "--instance-type",
                instance_type,
                "--security-groups",
                security_group,
                "--key-name",
                key_name,
                "--count",
                "1",
            ])
            .await?;
        let parsed: RunInstances =
            serde_json::from_slice(&stdout).context("invalid JSON from run-instances")?;
        parsed
            .instances
            .into_iter()
            .next()
            .map(|i| MachineHandle(i.instance_id))
            .ok_or_else(|| anyhow::anyhow!("run-instances returned no instance"))
    }

    async fn status(&self, handle: &MachineHandle) -> Result<MachineStatus> {
        let Some(instance) = self.try_describe(handle).await? else {
            tracing::debug!(machine = %handle, "instance not visible yet");
            return Ok(MachineStatus::Starting);
        };
        Ok(instance
            .state
            .map_or(MachineStatus::Starting, |s| status_from_state(&s.name)))
    }

    async fn endpoint(&self, handle: &MachineHandle) -> Result<Endpoint> {
        let instance = self.describe(handle).await?;
        let host = instance
            .public_dns_name
            .filter(|h| !h.is_empty())
            .or(instance.public_ip_address)
            .ok_or_else(|| anyhow::anyhow!("instance {handle} has no public address"))?;
        Ok(Endpoint {
            host,
            port: 22,
            user: String::new(),
            identity_file: PathBuf::new(),
        })
    }

    async fn destroy(&self, handle: &MachineHandle) -> Result<()> {
        self.ec2(&["terminate-instances", "--instance-ids", &handle.0])
            .await
            .map(|_| ())
    }
}

impl<R: CommandRunner> CloudAccess for AwsCli<R> {
    async fn list_images(&self) -> Result<Vec<String>> {
        let mut args = vec!["describe-images", "--owners"];
        args.extend(self.image_owners.iter().map(String::as_str));
        let stdout = self.ec2(&args).await?;
        let parsed: DescribeImages =
            serde_json::from_slice(&stdout).context("invalid JSON from describe-images")?;
        Ok(parsed.images.into_iter().map(|i| i.image_id).collect())
    }

    async fn security_group_exists(&self, name: &str) -> Result<bool> {
        let output = self
            .ec2_raw(&["describe-security-groups", "--group-names", name])
            .await?;
        if output.status.success() {
            return Ok(true);
        }
        if String::from_utf8_lossy(&output.stderr).contains(GROUP_NOT_FOUND) {
            return Ok(false);
        }
        ensure_success(&output, "aws ec2 describe-security-groups").map(|()| false)
    }

    async fn create_security_group(&self, name: &str) -> Result<()> {
        self.ec2(&[
            "create-security-group",
            "--group-name",
            name,
            "--description",
            "throwbox configuration",
        ])
        .await?;
        self.ec2(&[
            "authorize-security-group-ingress",
            "--group-name",
            name,
            "--protocol",
            "tcp",
            "--port",
            "22",
            "--cidr",
            "0.0.0.0/0",
        ])
        .await
        .map(|_| ())
    }

    async fn create_key_pair(&self, name: &str) -> Result<String> {
        let stdout = self.ec2(&["create-key-pair", "--key-name", name]).await?;
        let parsed: KeyPair =
            serde_json::from_slice(&stdout).context("invalid JSON from create-key-pair")?;
        Ok(parsed.key_material)
    }

    async fn delete_key_pair(&self, name: &str) -> Result<()> {
        self.ec2(&["delete-key-pair", "--key-name", name])
            .await
            .map(|_| ())
    }
}
