//! In-process job queue feed.
//!
//! Jobs publish every state transition as a [`JobEvent`] on an unbounded
//! channel; the consumer decides whether to print, log or forward them.

use throwbox_common::{JobEvent, JobState};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::application::ports::JobStateSink;

/// `JobStateSink` that forwards transitions onto a channel.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: UnboundedSender<JobEvent>,
}

impl ChannelReporter {
    /// A reporter plus the receiving end of its channel.
    #[must_use]
    pub fn channel() -> (Self, UnboundedReceiver<JobEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

impl JobStateSink for ChannelReporter {
    fn report(&self, job_id: &str, state: JobState) {
        tracing::debug!(job = job_id, state = state.as_str(), "job event");
        if self.tx.send(JobEvent::now(job_id, state)).is_err() {
            tracing::debug!(job = job_id, "job event receiver dropped");
        }
    }
}
