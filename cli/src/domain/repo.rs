//! Repository checkout layout and commit metadata validation.

use anyhow::Result;

/// Subdirectory of the box working directory the repository is cloned into.
pub const REPO_ROOT: &str = "repo";

/// Where the clone is uploaded on cloud machines, relative to the login
/// user's home directory.
pub const REMOTE_REPO_ROOT: &str = "repo";

/// Checks that `sha` is a full 40-character hexadecimal commit hash.
///
/// # Errors
///
/// Returns an error if the length or character set is wrong.
pub fn validate_commit_sha(sha: &str) -> Result<()> {
    anyhow::ensure!(
        sha.len() == 40,
        "commit sha must be 40 characters, got {} ({sha:?})",
        sha.len()
    );
    anyhow::ensure!(
        sha.chars().all(|c| c.is_ascii_hexdigit()),
        "commit sha must be hexadecimal ({sha:?})"
    );
    Ok(())
}
