//! Recorded remote execution: the single choke point every phase command
//! goes through.

use crate::application::ports::{RemoteOutput, ShellSession};
use crate::domain::{BoxError, OutputLedger, normalize_output};

/// Run `command` on `session` and append `(command, output)` to the open
/// ledger bucket.
///
/// The command is trimmed before execution; the ledger keeps it as given.
/// Output line endings are normalized and trailing newlines dropped.
///
/// # Errors
///
/// Transport failures are returned unchanged and nothing is recorded.
pub async fn run_recorded(
    session: &impl ShellSession,
    ledger: &mut OutputLedger,
    command: &str,
) -> Result<RemoteOutput, BoxError> {
    let trimmed = command.trim();
    tracing::debug!(command = trimmed, "running remote command");
    let raw = session.run(trimmed).await?;
    let output = normalize_output(&raw.output);
    tracing::debug!(command = trimmed, exit_code = raw.exit_code, "remote command finished");
    ledger.record(command, &output);
    Ok(RemoteOutput {
        exit_code: raw.exit_code,
        output,
    })
}
