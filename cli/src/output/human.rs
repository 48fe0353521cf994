//! Human-readable terminal renderer.

use std::path::Path;

use owo_colors::OwoColorize as _;
use throwbox_common::{BackendKind, JobReport};

use crate::domain::{ThrowboxConfig, VALID_CONFIG_KEYS};
use crate::output::OutputContext;

/// Lines of phase output shown under a failed job.
const OUTPUT_TAIL_LINES: usize = 20;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if self.ctx.quiet {
            return;
        }
        println!("throwbox {version}");
    }

    /// Render every report followed by a one-line summary. The summary is
    /// printed even in quiet mode.
    pub fn render_reports(&self, reports: &[JobReport]) {
        for report in reports {
            println!();
            self.render_report(report);
        }
        let failed = reports.iter().filter(|r| !r.success()).count();
        println!();
        if failed == 0 {
            println!(
                "  {} {} job(s) passed",
                "✓".style(self.ctx.styles.success),
                reports.len()
            );
        } else {
            println!(
                "  {} {failed} of {} job(s) failed",
                "✗".style(self.ctx.styles.error),
                reports.len()
            );
        }
    }

    /// Render one job report.
    pub fn render_report(&self, report: &JobReport) {
        let title = if report.repo.is_empty() {
            report.job_id.clone()
        } else {
            format!("{} {}#{}", report.job_id, report.repo, report.build_index)
        };
        self.ctx.header(&title);

        if let Some(sha) = &report.commit_sha {
            self.ctx.kv("Commit:", sha);
        }
        if let Some(message) = &report.commit_message
            && let Some(subject) = message.lines().next()
        {
            self.ctx.kv("Message:", subject);
        }
        let elapsed = report.finished_at - report.started_at;
        self.ctx
            .kv("Duration:", &format!("{}s", elapsed.num_seconds().max(0)));

        for result in &report.results {
            if result.passed {
                self.ctx.success(&result.command);
            } else {
                self.ctx.warn(&format!(
                    "{} (exit {})",
                    result.command, result.exit_code
                ));
            }
        }

        if let Some(error) = &report.error {
            self.ctx.error(&format!("{}: {error}", report.job_id));
        }
        if !report.success() {
            let failing = [
                ("setup", &report.setup_output),
                ("test", &report.test_output),
            ];
            for (phase, text) in failing {
                if !text.trim().is_empty() {
                    self.render_tail(phase, text);
                }
            }
        }
    }

    fn render_tail(&self, phase: &str, text: &str) {
        if self.ctx.quiet {
            return;
        }
        self.ctx.info(&format!("last {phase} output:"));
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
        for line in &lines[start..] {
            println!("    {}", line.style(self.ctx.styles.dim));
        }
    }

    /// Render the template names of one backend.
    pub fn render_templates(&self, backend: BackendKind, templates: &[String]) {
        if templates.is_empty() {
            self.ctx.warn(&format!("No {backend} templates available"));
            return;
        }
        self.ctx.header(&format!("{backend} templates:"));
        for name in templates {
            println!("    {name}");
        }
    }

    /// Render the full configuration, one whitelisted key per line.
    pub fn render_config(&self, config: &ThrowboxConfig, path: &Path) {
        self.ctx.header("Configuration");
        self.ctx.kv("File:", &path.display().to_string());
        println!();
        for key in VALID_CONFIG_KEYS {
            let value = config.get(key).unwrap_or_default();
            let value = if value.is_empty() { "-".to_string() } else { value };
            self.ctx.kv(&format!("{key}:"), &value);
        }
    }

    /// Render a single value bare, so it can be captured by scripts.
    pub fn render_value(&self, _key: &str, value: &str) {
        println!("{value}");
    }
}
