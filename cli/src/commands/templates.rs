//! `throwbox templates` — list the templates a backend accepts.

use anyhow::Result;
use clap::Args;
use std::process::ExitCode;
use throwbox_common::BackendKind;

use crate::app::AppContext;
use crate::application::services::config_service;
use crate::application::services::vm::{BoxBackend, CloudBackend, LocalBackend, ProvisionLock};
use crate::infra::aws::AwsCli;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::vagrant::VagrantCli;

/// Arguments for the templates command.
#[derive(Args)]
pub struct TemplatesArgs {
    /// Backend whose templates to list
    #[arg(long, value_enum, default_value_t = BackendKind::Local)]
    pub backend: BackendKind,
}

/// Run the templates command.
///
/// # Errors
///
/// Returns an error if the template source cannot be listed.
pub async fn run(app: &AppContext, args: &TemplatesArgs) -> Result<ExitCode> {
    let config = config_service::load_config(&app.config_store)?;
    let runner = TokioCommandRunner::default();
    let names = match args.backend {
        BackendKind::Local => {
            LocalBackend::new(
                VagrantCli::new(runner),
                config.local.template_dir.clone(),
                ProvisionLock::new(),
                config.local.readiness(),
            )
            .templates()
            .await?
        }
        BackendKind::Cloud => {
            CloudBackend::new(
                AwsCli::new(runner, config.cloud.region.clone())
                    .with_image_owners(config.cloud.image_owners.clone()),
                &config.cloud,
                ProvisionLock::new(),
            )
            .templates()
            .await?
        }
    };
    app.renderer().render_templates(args.backend, &names)?;
    Ok(ExitCode::SUCCESS)
}
