//! `throwbox run` — run CI jobs in throwaway boxes.
//!
//! Every job file holds one job description. All jobs run concurrently on
//! the current task; the provisioning locks are shared so local `vagrant up`
//! calls never overlap and only one job creates the cloud security group.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use futures_util::future::join_all;
use throwbox_common::{BackendKind, JobReport, JobRequest};

use crate::app::AppContext;
use crate::application::ports::JobStateSink;
use crate::application::services::config_service;
use crate::application::services::job::{JobOptions, run_job};
use crate::application::services::vm::{CloudBackend, LocalBackend, ProvisionLock};
use crate::domain::generate_job_id;
use crate::infra::aws::AwsCli;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::git::GitCli;
use crate::infra::queue::ChannelReporter;
use crate::infra::ssh::OpenSsh;
use crate::infra::vagrant::VagrantCli;
use crate::output::TerminalReporter;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Job description files (YAML)
    #[arg(required = true)]
    pub jobs: Vec<PathBuf>,

    /// Run every job on this backend, whatever its file says
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}

/// Load one job description.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid job.
pub fn load_request(path: &Path) -> Result<JobRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read job file {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("cannot parse job file {}", path.display()))
}

/// Run the run command.
///
/// Exits with failure when any job errored or had a failing test.
///
/// # Errors
///
/// Returns an error if the configuration or a job file cannot be loaded.
pub async fn run(app: &AppContext, args: &RunArgs) -> Result<ExitCode> {
    let config = config_service::load_config(&app.config_store)?;
    let mut requests = args
        .jobs
        .iter()
        .map(|path| load_request(path))
        .collect::<Result<Vec<_>>>()?;
    if let Some(backend) = args.backend {
        for request in &mut requests {
            request.backend = backend;
        }
    }

    let runner = TokioCommandRunner::default();
    let local = LocalBackend::new(
        VagrantCli::new(runner),
        config.local.template_dir.clone(),
        ProvisionLock::new(),
        config.local.readiness(),
    );
    let cloud = CloudBackend::new(
        AwsCli::new(runner, config.cloud.region.clone())
            .with_image_owners(config.cloud.image_owners.clone()),
        &config.cloud,
        ProvisionLock::new(),
    );
    let shell = OpenSsh::new(runner);
    let git = GitCli::new(runner);
    let options = JobOptions {
        default_key: config.git.private_key.clone(),
        setup_policy: config.setup_failure,
    };

    let (reporter, mut events) = ChannelReporter::channel();
    let jobs: Vec<_> = requests
        .iter()
        .map(|request| {
            let job_id = generate_job_id();
            let reporter = reporter.clone();
            let (local, cloud, shell, git, options) = (&local, &cloud, &shell, &git, &options);
            async move {
                tracing::info!(job = %job_id, backend = %request.backend, template = %request.template, "job queued");
                match request.backend {
                    BackendKind::Local => {
                        run_job(&job_id, request, local, shell, git, options, reporter).await
                    }
                    BackendKind::Cloud => {
                        run_job(&job_id, request, cloud, shell, git, options, reporter).await
                    }
                }
            }
        })
        .collect();
    drop(reporter);

    let printer = TerminalReporter::new(&app.output);
    let (reports, ()) = tokio::join!(join_all(jobs), async {
        while let Some(event) = events.recv().await {
            if !app.is_json() {
                printer.report(&event.job_id, event.state);
            }
        }
    });

    app.renderer().render_reports(&reports)?;
    Ok(exit_code(&reports))
}

fn exit_code(reports: &[JobReport]) -> ExitCode {
    if reports.iter().all(JobReport::success) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
