//! Output ledger — per-phase record of executed commands and their output.

use serde::Serialize;

/// A named stage of sequential command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Setup,
    Test,
    Deploy,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Test => f.write_str("test"),
            Self::Deploy => f.write_str("deploy"),
        }
    }
}

/// One executed command and what it printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub command: String,
    pub output: String,
}

/// Commands recorded for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub phase: Phase,
    pub entries: Vec<LedgerEntry>,
}

impl Bucket {
    /// Render as command / output lines interleaved, one per line.
    #[must_use]
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .flat_map(|e| [e.command.as_str(), e.output.as_str()])
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `(command, output)` pairs, for assertions and display.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.command.as_str(), e.output.as_str()))
            .collect()
    }
}

/// Append-only sequence of phase buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputLedger {
    buckets: Vec<Bucket>,
}

impl OutputLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new bucket. Called at the start of every phase, even when the
    /// phase has no commands.
    pub fn open(&mut self, phase: Phase) {
        self.buckets.push(Bucket {
            phase,
            entries: Vec::new(),
        });
    }

    /// Append to the most recently opened bucket, opening an unnamed setup
    /// bucket first if none exists.
    pub fn record(&mut self, command: &str, output: &str) {
        if self.buckets.is_empty() {
            self.open(Phase::Setup);
        }
        if let Some(bucket) = self.buckets.last_mut() {
            bucket.entries.push(LedgerEntry {
                command: command.to_string(),
                output: output.to_string(),
            });
        }
    }

    #[must_use]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Rendered text of the first bucket recorded for `phase`; empty when the
    /// phase never ran.
    #[must_use]
    pub fn text(&self, phase: Phase) -> String {
        self.buckets
            .iter()
            .find(|b| b.phase == phase)
            .map(Bucket::render)
            .unwrap_or_default()
    }
}

/// Normalize captured output: `\r\r`, `\r\n` and bare `\r` become `\n`,
/// trailing newlines are dropped.
#[must_use]
pub fn normalize_output(raw: &str) -> String {
    let out = raw
        .replace("\r\r", "\n")
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    out.trim_end_matches('\n').to_string()
}
