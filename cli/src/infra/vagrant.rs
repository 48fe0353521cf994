//! `MachineProvider` adapter driving the `vagrant` CLI.
//!
//! A machine handle is the directory holding the box's `Vagrantfile`; every
//! call runs with that directory as its working directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::{
    CommandRunner, Endpoint, MachineDescriptor, MachineHandle, MachineProvider, MachineStatus,
};
use crate::infra::command_runner::{DEFAULT_CMD_TIMEOUT, PROVISION_TIMEOUT, ensure_success};

/// Vagrant driven through its command-line interface.
pub struct VagrantCli<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> VagrantCli<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn vagrant(&self, handle: &MachineHandle, args: &[&str], what: &str) -> Result<String> {
        let dir = Path::new(&handle.0);
        let timeout = if args.first() == Some(&"up") {
            PROVISION_TIMEOUT
        } else {
            DEFAULT_CMD_TIMEOUT
        };
        let output = self
            .runner
            .run_in(dir, "vagrant", args, timeout)
            .await
            .with_context(|| format!("failed to run {what}"))?;
        ensure_success(&output, what)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl<R: CommandRunner> MachineProvider for VagrantCli<R> {
    async fn create(&self, descriptor: &MachineDescriptor) -> Result<MachineHandle> {
        let MachineDescriptor::Vagrant { root } = descriptor else {
            anyhow::bail!("vagrant cannot provision {descriptor:?}");
        };
        let handle = MachineHandle(root.display().to_string());
        self.vagrant(&handle, &["up"], "vagrant up").await?;
        Ok(handle)
    }

    async fn status(&self, handle: &MachineHandle) -> Result<MachineStatus> {
        let stdout = self
            .vagrant(handle, &["status", "--machine-readable"], "vagrant status")
            .await?;
        let state = parse_machine_state(&stdout)
            .ok_or_else(|| anyhow::anyhow!("no state in vagrant status output"))?;
        Ok(status_from_state(state))
    }

    async fn endpoint(&self, handle: &MachineHandle) -> Result<Endpoint> {
        let stdout = self
            .vagrant(handle, &["ssh-config"], "vagrant ssh-config")
            .await?;
        parse_ssh_config(&stdout)
    }

    async fn destroy(&self, handle: &MachineHandle) -> Result<()> {
        self.vagrant(handle, &["destroy", "-f"], "vagrant destroy")
            .await
            .map(|_| ())
    }
}

/// Extract the machine state from `vagrant status --machine-readable`.
///
/// Lines have the form `timestamp,target,type,data`; the state is the data
/// of the first `state` line.
#[must_use]
pub fn parse_machine_state(stdout: &str) -> Option<&str> {
    stdout.lines().find_map(|line| {
        let mut fields = line.splitn(4, ',');
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(_), Some(_), Some("state"), Some(state)) => Some(state.trim()),
            _ => None,
        }
    })
}

/// Map a Vagrant machine state onto the coarse status.
#[must_use]
pub fn status_from_state(state: &str) -> MachineStatus {
    match state {
        "running" => MachineStatus::Running,
        "poweroff" | "aborted" | "inaccessible" | "gurumeditation" | "stuck" => {
            MachineStatus::Error
        }
        _ => MachineStatus::Starting,
    }
}

/// Parse `vagrant ssh-config` output into an endpoint.
///
/// # Errors
///
/// Returns an error if `HostName`, `Port`, `User` or `IdentityFile` is
/// missing or the port is not a number.
pub fn parse_ssh_config(stdout: &str) -> Result<Endpoint> {
    let mut host = None;
    let mut port = None;
    let mut user = None;
    let mut identity = None;
    for line in stdout.lines() {
        let Some((key, value)) = line.trim().split_once(char::is_whitespace) else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key {
            "HostName" => host = Some(value.to_string()),
            "Port" => {
                port = Some(
                    value
                        .parse::<u16>()
                        .with_context(|| format!("invalid ssh port {value:?}"))?,
                );
            }
            "User" => user = Some(value.to_string()),
            "IdentityFile" if identity.is_none() => identity = Some(PathBuf::from(value)),
            _ => {}
        }
    }
    let missing = |field: &str| anyhow::anyhow!("vagrant ssh-config has no {field}");
    Ok(Endpoint {
        host: host.ok_or_else(|| missing("HostName"))?,
        port: port.ok_or_else(|| missing("Port"))?,
        user: user.ok_or_else(|| missing("User"))?,
        identity_file: identity.ok_or_else(|| missing("IdentityFile"))?,
    })
}
