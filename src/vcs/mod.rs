//! Version control backend
//!
//! Both the primary repository and the session snapshot repository are driven
//! through [`VcsBackend`]. The exit status of each call is the only success
//! signal; stdout is parsed for identifiers only.

mod git;

#[cfg(test)]
pub mod fake;

pub use git::Git;

#[cfg(test)]
pub(crate) use git::scratch_repo;

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from VCS subprocess calls
#[derive(Debug, Error)]
pub enum VcsError {
    /// The subprocess could not be started.
    #[error("failed to run `{command}` in {dir}: {source}")]
    Spawn {
        command: String,
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The subprocess exited non-zero.
    #[error("`{command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Output could not be interpreted.
    #[error("unexpected output from `{command}`: {detail}")]
    Parse { command: String, detail: String },
}

pub type Result<T> = std::result::Result<T, VcsError>;

/// One `git stash list` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashEntry {
    /// e.g. `stash@{0}`
    pub reference: String,
    /// Reflog subject, e.g. `On main: sessions-for-<sha>`
    pub message: String,
}

pub trait VcsBackend {
    /// Working tree this backend operates on
    fn root(&self) -> &Path;

    fn is_initialized(&self) -> bool;

    fn init(&self) -> Result<()>;

    /// Stage `pathspec` and commit. Returns `false` when there was nothing to
    /// commit and `allow_empty` is off.
    fn commit_all(&self, pathspec: &str, message: &str, allow_empty: bool) -> Result<bool>;

    /// Point tag `name` at HEAD, replacing any existing tag of that name
    fn tag_head(&self, name: &str) -> Result<()>;

    /// Resolve a revision, `None` if it doesn't exist
    fn rev_parse(&self, rev: &str) -> Result<Option<String>>;

    fn is_merge_commit(&self, rev: &str) -> Result<bool>;

    /// Configured author email
    fn author(&self) -> Result<Option<String>>;

    fn commit_time(&self, rev: &str) -> Result<Option<DateTime<Utc>>>;

    /// Newest commit on a branch or tag with a message line equal to
    /// `subject`. Stash commits are never considered.
    fn find_commit_by_subject(&self, subject: &str) -> Result<Option<String>>;

    /// Oldest parentless commit on a branch or tag
    fn root_commit(&self) -> Result<Option<String>>;

    fn checkout(&self, rev: &str) -> Result<()>;

    /// Newest first
    fn stash_list(&self) -> Result<Vec<StashEntry>>;

    /// Stash tracked and untracked changes. Returns `false` if the tree was clean.
    fn stash_push(&self, message: &str) -> Result<bool>;

    fn stash_pop(&self, reference: &str) -> Result<()>;

    fn stash_drop(&self, reference: &str) -> Result<()>;

    fn has_uncommitted_changes(&self) -> Result<bool>;

    /// Repository-local config value
    fn config_get(&self, key: &str) -> Result<Option<String>>;

    fn config_set(&self, key: &str, value: &str) -> Result<()>;
}
