//! `TerminalReporter` — presentation-layer implementation of `JobStateSink`.
//!
//! Wraps `&OutputContext` so the job service can announce state changes
//! without depending on any presentation type directly.

use owo_colors::OwoColorize as _;
use throwbox_common::JobState;

use crate::application::ports::JobStateSink;
use crate::output::OutputContext;

/// Prints `"  → {job_id} {STATE}"` for every transition (suppressed when
/// `ctx.quiet`).
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }
}

impl JobStateSink for TerminalReporter<'_> {
    fn report(&self, job_id: &str, state: JobState) {
        if self.ctx.quiet {
            return;
        }
        let style = match state {
            JobState::StartupFailed => self.ctx.styles.error,
            JobState::Finished => self.ctx.styles.success,
            _ => self.ctx.styles.state,
        };
        println!(
            "  {} {} {}",
            "→".style(self.ctx.styles.info),
            job_id.style(self.ctx.styles.dim),
            state.as_str().style(style)
        );
    }
}
