//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::app::{AppContext, OutputFlags};
use crate::commands;

/// Run CI jobs in throwaway virtual machines
#[derive(Parser)]
#[command(
    name = "throwbox",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run jobs, each in its own throwaway box
    Run(commands::run::RunArgs),

    /// List the templates a backend accepts
    Templates(commands::templates::TemplatesArgs),

    /// Print the public repository key
    Pubkey,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli {
            no_color,
            quiet,
            json,
            command,
        } = self;
        let app = AppContext::new(&OutputFlags {
            no_color,
            quiet,
            json,
        });
        match command {
            Command::Run(args) => commands::run::run(&app, &args).await,
            Command::Templates(args) => commands::templates::run(&app, &args).await,
            Command::Pubkey => commands::pubkey::run(&app),
            Command::Config(cmd) => commands::config::run(&app, cmd),
            Command::Version => commands::version::run(&app),
        }
    }
}
