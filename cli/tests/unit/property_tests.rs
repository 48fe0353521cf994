//! Property-based tests for id generation, validation, output normalisation
//! and the job state machine.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::expect_used)]

use proptest::prelude::*;

use throwbox_cli::domain::repo::validate_commit_sha;
use throwbox_cli::domain::{
    OutputLedger, Phase, VALID_CONFIG_KEYS, generate_job_id, normalize_output,
    validate_config_key, validate_config_value,
};
use throwbox_common::JobState;

const STATES: [JobState; 9] = [
    JobState::Initialising,
    JobState::Cloning,
    JobState::Starting,
    JobState::StartupFailed,
    JobState::Setuping,
    JobState::Testing,
    JobState::Deploying,
    JobState::Destroying,
    JobState::Finished,
];

// ============================================================================
// generate_job_id()
// ============================================================================

proptest! {
    /// Generated IDs always have the job- prefix followed by 16 hex chars.
    #[test]
    fn prop_job_id_has_valid_format(_seed in 0u32..100) {
        let id = generate_job_id();
        prop_assert!(id.starts_with("job-"), "missing job- prefix: {}", id);
        prop_assert_eq!(id.len(), 20, "wrong length: {}", id);
        prop_assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()), "non-hex chars: {}", id);
    }
}

#[test]
fn test_job_id_uniqueness_batch() {
    let ids: std::collections::HashSet<_> = (0..100).map(|_| generate_job_id()).collect();
    assert_eq!(ids.len(), 100, "duplicate IDs generated");
}

// ============================================================================
// Configuration validators
// ============================================================================

proptest! {
    /// Keys outside the whitelist are rejected.
    #[test]
    fn prop_arbitrary_keys_rejected(key in "[a-z]{1,12}\\.[a-z_]{1,20}") {
        if !VALID_CONFIG_KEYS.contains(&key.as_str()) {
            prop_assert!(validate_config_key(&key).is_err(), "accepted invalid key: {key}");
        }
    }

    /// Attempt counts must be positive integers.
    #[test]
    fn prop_attempts_accept_positive_integers(n in 1u32..100_000) {
        prop_assert!(validate_config_value("local.max_status_attempts", &n.to_string()).is_ok());
        prop_assert!(validate_config_value("cloud.max_status_attempts", &n.to_string()).is_ok());
    }

    /// Non-numeric text is never a valid interval.
    #[test]
    fn prop_intervals_reject_words(value in "[a-z]{1,10}") {
        prop_assert!(validate_config_value("cloud.poll_interval_secs", &value).is_err());
    }
}

#[test]
fn test_zero_attempts_rejected() {
    assert!(validate_config_value("local.max_status_attempts", "0").is_err());
}

// ============================================================================
// Commit sha validation
// ============================================================================

proptest! {
    #[test]
    fn prop_forty_hex_chars_are_a_valid_sha(sha in "[0-9a-f]{40}") {
        prop_assert!(validate_commit_sha(&sha).is_ok());
    }

    #[test]
    fn prop_other_lengths_are_rejected(sha in "[0-9a-f]{0,39}") {
        prop_assert!(validate_commit_sha(&sha).is_err());
    }
}

// ============================================================================
// Output normalisation and the ledger
// ============================================================================

proptest! {
    /// Normalised output never contains carriage returns or a trailing newline.
    #[test]
    fn prop_normalized_output_has_no_cr(raw in "[a-z \\r\\n]{0,80}") {
        let out = normalize_output(&raw);
        prop_assert!(!out.contains('\r'));
        prop_assert!(!out.ends_with('\n'));
    }

    /// Every recorded command lands in the bucket of the phase that was open.
    #[test]
    fn prop_ledger_keeps_commands_in_phase_order(
        setup in prop::collection::vec("[a-z]{1,8}", 0..5),
        test in prop::collection::vec("[a-z]{1,8}", 0..5),
    ) {
        let mut ledger = OutputLedger::new();
        ledger.open(Phase::Setup);
        for c in &setup {
            ledger.record(c, "");
        }
        ledger.open(Phase::Test);
        for c in &test {
            ledger.record(c, "");
        }
        let buckets = ledger.buckets();
        prop_assert_eq!(buckets.len(), 2);
        let recorded: Vec<&str> = buckets[0].entries.iter().map(|e| e.command.as_str()).collect();
        let expected: Vec<&str> = setup.iter().map(String::as_str).collect();
        prop_assert_eq!(recorded, expected);
        prop_assert_eq!(buckets[1].entries.len(), test.len());
    }
}

// ============================================================================
// Job state machine
// ============================================================================

proptest! {
    /// A transition and its reverse are never both valid.
    #[test]
    fn prop_transitions_are_one_way(a in 0usize..9, b in 0usize..9) {
        let (from, to) = (STATES[a], STATES[b]);
        prop_assert!(!(from.can_advance_to(to) && to.can_advance_to(from)));
    }

    /// `StartupFailed` is only reachable from `Starting`.
    #[test]
    fn prop_startup_failed_only_from_starting(a in 0usize..9) {
        let from = STATES[a];
        prop_assert_eq!(
            from.can_advance_to(JobState::StartupFailed),
            from == JobState::Starting
        );
    }
}

#[test]
fn test_finished_is_terminal() {
    assert!(STATES.iter().all(|s| !JobState::Finished.can_advance_to(*s)));
}
