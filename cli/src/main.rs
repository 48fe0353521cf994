//! throwbox - run CI jobs in throwaway virtual machines

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use throwbox_cli::cli::Cli;
use throwbox_cli::output::json::format_error;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            if json && let Ok(text) = format_error(&format!("{e:#}"), "error") {
                println!("{text}");
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}
