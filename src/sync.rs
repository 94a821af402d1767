//! Checkout synchronization
//!
//! Runs after the primary repository has moved from `old_sha` to `new_sha`
//! and brings the snapshot repository along:
//!
//! 1. stash uncommitted session state under `sessions-for-<old_sha>`
//! 2. find the snapshot commit recorded for `new_sha` (by its exact
//!    message, on branches and tags only), or the root commit
//! 3. check that commit out
//! 4. pop the stash tagged `sessions-for-<new_sha>`, if there is one
//!
//! The primary checkout has already happened by the time this runs, so no
//! step returns an error. Failures are logged and collected in the outcome.

use crate::capture::snapshot_commit_message;
use crate::vcs::VcsBackend;

/// Local config key holding the primary commit the snapshot tree reflects
pub const SYNCED_KEY: &str = "cc-context.synced";

pub fn stash_tag(sha: &str) -> String {
    format!("sessions-for-{}", sha)
}

pub fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutKind {
    Branch,
    File,
}

impl CheckoutKind {
    /// post-checkout passes "1" for branch checkouts, "0" for file checkouts
    pub fn from_flag(flag: &str) -> Self {
        if flag.trim() == "1" {
            Self::Branch
        } else {
            Self::File
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    FileCheckout,
    NotInitialized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Neither a recorded commit nor a root commit exists
    NoTarget,
    CheckoutFailed { target: String, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    /// A snapshot commit references the new primary commit
    Recorded,
    /// Nothing recorded yet; fell back to the root commit
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    AlreadySynced,
    Aborted {
        reason: AbortReason,
        stashed: bool,
        warnings: Vec<String>,
    },
    Completed {
        target: String,
        target_source: TargetSource,
        stashed: bool,
        /// Stash reference that was popped
        restored: Option<String>,
        warnings: Vec<String>,
    },
}

/// Drives the snapshot repository through one primary checkout
pub struct CheckoutSynchronizer<'a> {
    primary: &'a dyn VcsBackend,
    snapshot: &'a dyn VcsBackend,
}

impl<'a> CheckoutSynchronizer<'a> {
    pub fn new(primary: &'a dyn VcsBackend, snapshot: &'a dyn VcsBackend) -> Self {
        Self { primary, snapshot }
    }

    /// Expand an abbreviated sha through the primary repo when possible
    fn full_sha(&self, sha: &str) -> String {
        match self.primary.rev_parse(sha) {
            Ok(Some(full)) => full,
            Ok(None) => sha.to_string(),
            Err(e) => {
                tracing::debug!("could not resolve {} in primary repo: {}", sha, e);
                sha.to_string()
            }
        }
    }

    pub fn run(&self, old_sha: &str, new_sha: &str, kind: CheckoutKind) -> SyncOutcome {
        if kind == CheckoutKind::File {
            return SyncOutcome::Skipped(SkipReason::FileCheckout);
        }
        if !self.snapshot.is_initialized() {
            tracing::info!("session snapshot repo not initialized, skipping checkout sync");
            return SyncOutcome::Skipped(SkipReason::NotInitialized);
        }

        let old_sha = self.full_sha(old_sha);
        let new_sha = self.full_sha(new_sha);
        let mut warnings = vec![];

        match self.snapshot.config_get(SYNCED_KEY) {
            Ok(Some(synced)) if synced == new_sha => return SyncOutcome::AlreadySynced,
            Ok(_) => {}
            Err(e) => warn(&mut warnings, format!("Could not read sync marker: {}", e)),
        }

        let stashed = self.stash(&old_sha, &mut warnings);

        let Some((target, target_source)) = self.resolve_target(&new_sha, &mut warnings) else {
            return SyncOutcome::Aborted {
                reason: AbortReason::NoTarget,
                stashed,
                warnings,
            };
        };

        if let Err(e) = self.snapshot.checkout(&target) {
            tracing::warn!("Failed to checkout snapshot commit {}: {}", short_sha(&target), e);
            return SyncOutcome::Aborted {
                reason: AbortReason::CheckoutFailed {
                    target,
                    error: e.to_string(),
                },
                stashed,
                warnings,
            };
        }

        let restored = self.restore(&new_sha, &mut warnings);

        if let Err(e) = self.snapshot.config_set(SYNCED_KEY, &new_sha) {
            warn(&mut warnings, format!("Could not record sync marker: {}", e));
        }

        SyncOutcome::Completed {
            target,
            target_source,
            stashed,
            restored,
            warnings,
        }
    }

    /// Stash the working tree under `old_sha`, keeping only the newest stash
    /// per tag
    fn stash(&self, old_sha: &str, warnings: &mut Vec<String>) -> bool {
        let tag = stash_tag(old_sha);
        match self.snapshot.stash_push(&tag) {
            Ok(true) => {
                self.drop_superseded(&tag, warnings);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn(warnings, format!("Failed to stash current sessions: {}", e));
                false
            }
        }
    }

    fn drop_superseded(&self, tag: &str, warnings: &mut Vec<String>) {
        let entries = match self.snapshot.stash_list() {
            Ok(entries) => entries,
            Err(e) => {
                warn(warnings, format!("Could not list stashes: {}", e));
                return;
            }
        };
        // Newest first; drop from the oldest so references stay valid.
        let older: Vec<_> = entries
            .iter()
            .filter(|s| s.message.ends_with(tag))
            .skip(1)
            .collect();
        for entry in older.into_iter().rev() {
            if let Err(e) = self.snapshot.stash_drop(&entry.reference) {
                warn(
                    warnings,
                    format!("Failed to drop superseded stash {}: {}", entry.reference, e),
                );
            }
        }
    }

    fn resolve_target(
        &self,
        new_sha: &str,
        warnings: &mut Vec<String>,
    ) -> Option<(String, TargetSource)> {
        match self
            .snapshot
            .find_commit_by_subject(&snapshot_commit_message(new_sha))
        {
            Ok(Some(commit)) => return Some((commit, TargetSource::Recorded)),
            Ok(None) => {}
            Err(e) => warn(warnings, format!("Snapshot log search failed: {}", e)),
        }

        match self.snapshot.root_commit() {
            Ok(Some(root)) => Some((root, TargetSource::Root)),
            Ok(None) => {
                tracing::warn!("Could not find initial commit in snapshot repo");
                None
            }
            Err(e) => {
                warn(warnings, format!("Could not find initial commit: {}", e));
                None
            }
        }
    }

    fn restore(&self, new_sha: &str, warnings: &mut Vec<String>) -> Option<String> {
        let tag = stash_tag(new_sha);
        let entries = match self.snapshot.stash_list() {
            Ok(entries) => entries,
            Err(e) => {
                warn(warnings, format!("Could not list stashes: {}", e));
                return None;
            }
        };
        let entry = entries.into_iter().find(|s| s.message.ends_with(&tag))?;

        match self.snapshot.stash_pop(&entry.reference) {
            Ok(()) => Some(entry.reference),
            Err(e) => {
                warn(
                    warnings,
                    format!("Failed to restore sessions from {}: {}", entry.reference, e),
                );
                None
            }
        }
    }
}

fn warn(warnings: &mut Vec<String>, message: String) {
    tracing::warn!("{}", message);
    warnings.push(message);
}
