//! Bounded readiness polling.

use crate::application::ports::{MachineHandle, MachineProvider, MachineStatus};
use crate::domain::BoxError;
use crate::domain::config::ReadinessPolicy;

/// Poll `handle` until it reports running, at most `policy.max_attempts`
/// times, sleeping `policy.interval` between polls. After the first running
/// status waits `policy.settle` once more.
///
/// # Errors
///
/// Returns [`BoxError::StartFailed`] when the machine reports an error, the
/// status query fails, or attempts are exhausted.
pub async fn wait_until_running(
    provider: &impl MachineProvider,
    handle: &MachineHandle,
    policy: ReadinessPolicy,
) -> Result<(), BoxError> {
    for attempt in 1..=policy.max_attempts {
        let status = provider
            .status(handle)
            .await
            .map_err(|e| BoxError::start_failed(format!("status query for {handle} failed: {e:#}")))?;
        match status {
            MachineStatus::Running => {
                tracing::info!(machine = %handle, attempt, "machine is running");
                if !policy.settle.is_zero() {
                    tokio::time::sleep(policy.settle).await;
                }
                return Ok(());
            }
            MachineStatus::Error => {
                return Err(BoxError::start_failed(format!(
                    "machine {handle} reported an error state"
                )));
            }
            MachineStatus::Starting => {
                tracing::debug!(machine = %handle, attempt, "machine still starting");
                if attempt < policy.max_attempts && !policy.interval.is_zero() {
                    tokio::time::sleep(policy.interval).await;
                }
            }
        }
    }
    Err(BoxError::start_failed(format!(
        "machine {handle} not running after {} status checks",
        policy.max_attempts
    )))
}
