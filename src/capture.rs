//! Capture the sessions behind a primary commit
//!
//! Runs after each primary commit: discover the logs, merge them, compare
//! against the parent commit's snapshot, then persist the metadata and the
//! merged context and commit the raw logs into the snapshot repository.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::continuity;
use crate::merge::{self, SessionWarning};
use crate::paths::Layout;
use crate::session::{self, to_jsonl};
use crate::store::{generate_context_id, open_context_storage, SnapshotMetadata, SnapshotStore};
use crate::sync::{short_sha, SYNCED_KEY};
use crate::vcs::VcsBackend;

pub const SNAPSHOT_PATHSPEC: &str = "*.jsonl";
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial Claude sessions";

/// Snapshot commit message; checkout sync searches for the sha in it
pub fn snapshot_commit_message(commit_sha: &str) -> String {
    format!("Context for main repo commit {}", commit_sha)
}

/// Tag keeping each snapshot commit reachable from `--all`
pub fn snapshot_tag(commit_sha: &str) -> String {
    format!("cc-context/{}", commit_sha)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotCommit {
    NotInitialized,
    /// Nothing changed in the session directory
    Clean,
    Committed,
    Failed(String),
}

#[derive(Debug)]
pub enum CaptureReport {
    SkippedMergeCommit {
        commit_sha: String,
    },
    Captured {
        commit_sha: String,
        /// `None` when no sessions were found
        metadata: Option<SnapshotMetadata>,
        warnings: Vec<SessionWarning>,
        snapshot: SnapshotCommit,
    },
}

pub fn capture(
    primary: &dyn VcsBackend,
    snapshot: &dyn VcsBackend,
    layout: &Layout,
    config: &Config,
) -> Result<CaptureReport> {
    let commit_sha = primary
        .rev_parse("HEAD")?
        .ok_or_else(|| anyhow!("no commits in {}", primary.root().display()))?;

    if primary.is_merge_commit("HEAD")? {
        tracing::info!("Skipping merge commit {}", short_sha(&commit_sha));
        return Ok(CaptureReport::SkippedMergeCommit { commit_sha });
    }

    let parent_commit = primary.rev_parse("HEAD^")?;
    let after = if config.capture.only_since_parent {
        parent_time(primary)
    } else {
        None
    };

    let mut sessions = session::discover(&layout.sessions_dir, after)
        .with_context(|| format!("discovering sessions in {}", layout.sessions_dir.display()))?;

    let mut warnings = vec![];
    let metadata = if sessions.is_empty() {
        tracing::info!("No sessions found for commit {}", short_sha(&commit_sha));
        None
    } else {
        let merged = merge::merge(&mut sessions, config.merge.order);
        warnings = merged.warnings;

        let store = SnapshotStore::open(layout);
        let records = continuity::analyze(
            &store,
            &sessions,
            parent_commit.as_deref(),
            config.continuity.unchanged,
        )?;

        let author = primary.author().unwrap_or_else(|e| {
            tracing::warn!("Could not read commit author: {}", e);
            None
        });

        let context_id = generate_context_id();
        let metadata = SnapshotMetadata::create(
            &commit_sha,
            parent_commit.as_deref(),
            &context_id,
            &sessions,
            &records,
            author.as_deref(),
        );

        let storage = open_context_storage(config.storage.backend, layout)?;
        storage.store(&context_id, &to_jsonl(&merged.messages))?;
        store.record_capture(&metadata, &sessions)?;

        tracing::info!(
            "Captured {} sessions ({} messages) for commit {} as {}",
            sessions.len(),
            metadata.total_messages,
            short_sha(&commit_sha),
            context_id
        );
        Some(metadata)
    };

    let snapshot = commit_snapshot(snapshot, &commit_sha);

    Ok(CaptureReport::Captured {
        commit_sha,
        metadata,
        warnings,
        snapshot,
    })
}

fn parent_time(primary: &dyn VcsBackend) -> Option<DateTime<Utc>> {
    match primary.commit_time("HEAD^") {
        Ok(time) => time,
        Err(e) => {
            tracing::warn!("Could not read parent commit time, scanning all sessions: {}", e);
            None
        }
    }
}

/// Commit the raw logs so checkout sync can find them again
fn commit_snapshot(snapshot: &dyn VcsBackend, commit_sha: &str) -> SnapshotCommit {
    if !snapshot.is_initialized() {
        tracing::debug!("snapshot repo not initialized, not committing sessions");
        return SnapshotCommit::NotInitialized;
    }

    let result = match snapshot.commit_all(
        SNAPSHOT_PATHSPEC,
        &snapshot_commit_message(commit_sha),
        false,
    ) {
        Ok(true) => {
            if let Err(e) = snapshot.tag_head(&snapshot_tag(commit_sha)) {
                tracing::warn!("Failed to tag snapshot commit: {}", e);
            }
            SnapshotCommit::Committed
        }
        Ok(false) => SnapshotCommit::Clean,
        Err(e) => {
            tracing::warn!("Failed to commit sessions to snapshot repo: {}", e);
            return SnapshotCommit::Failed(e.to_string());
        }
    };

    if let Err(e) = snapshot.config_set(SYNCED_KEY, commit_sha) {
        tracing::warn!("Could not record sync marker: {}", e);
    }
    result
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitReport {
    AlreadyInitialized,
    Initialized {
        /// Logs present when the repo was created
        sessions: usize,
    },
}

/// Turn the session directory into a snapshot repository with a root commit
pub fn init_snapshot_repo(snapshot: &dyn VcsBackend, layout: &Layout) -> Result<InitReport> {
    if snapshot.is_initialized() {
        return Ok(InitReport::AlreadyInitialized);
    }

    snapshot
        .init()
        .with_context(|| format!("initializing {}", snapshot.root().display()))?;

    if snapshot.author()?.is_none() {
        snapshot.config_set("user.name", "cc-context")?;
        snapshot.config_set("user.email", "cc-context@localhost")?;
    }

    let sessions = session::discover(&layout.sessions_dir, None)?.len();
    snapshot
        .commit_all(SNAPSHOT_PATHSPEC, INITIAL_COMMIT_MESSAGE, true)
        .context("creating initial snapshot commit")?;

    Ok(InitReport::Initialized { sessions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::fake::FakeVcs;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    fn layout(dir: &TempDir) -> Layout {
        let root = dir.path();
        let sessions_dir = root.join("sessions");
        fs::create_dir_all(&sessions_dir).unwrap();
        Layout {
            worktree: root.join("repo"),
            sessions_dir,
            snapshots_dir: root.join("repo/.cc-snapshots"),
            context_dir: root.join("repo/.cc-context"),
        }
    }

    fn append_messages(dir: &Path, id: &str, from: usize, to: usize) {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{}.jsonl", id)))
            .unwrap();
        for i in from..to {
            let line = serde_json::json!({
                "type": if i % 2 == 0 { "user" } else { "assistant" },
                "content": format!("message {}", i),
                "timestamp": format!("2024-01-01T10:00:{:02}Z", i),
                "uuid": format!("{}-{}", id, i),
            });
            writeln!(file, "{}", line).unwrap();
        }
    }

    fn captured(report: CaptureReport) -> (Option<SnapshotMetadata>, SnapshotCommit) {
        match report {
            CaptureReport::Captured {
                metadata, snapshot, ..
            } => (metadata, snapshot),
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn test_capture_then_continue() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        let config = Config::default();
        let primary = FakeVcs::new();
        primary.set_author("dev@example.com");
        let snapshot = FakeVcs::new();

        append_messages(&layout.sessions_dir, "s", 0, 10);
        primary.add_commit("c1", &[], None);
        let (c1, _) = captured(capture(&primary, &snapshot, &layout, &config).unwrap());
        let c1 = c1.unwrap();
        assert_eq!(c1.commit_sha, "c1");
        assert_eq!(c1.parent_commit, None);
        assert_eq!(c1.author, "dev@example.com");
        assert_eq!(c1.total_messages, 10);
        assert_eq!(c1.new_messages_since_parent, 10);
        assert!(!c1.sessions[0].continued_from_parent);

        append_messages(&layout.sessions_dir, "s", 10, 14);
        primary.add_commit("c2", &["c1"], None);
        let (c2, _) = captured(capture(&primary, &snapshot, &layout, &config).unwrap());
        let c2 = c2.unwrap();
        assert_eq!(c2.parent_commit.as_deref(), Some("c1"));
        assert!(c2.sessions[0].continued_from_parent);
        assert_eq!(c2.sessions[0].new_messages, 4);
        assert_eq!(c2.total_messages, 14);

        let store = SnapshotStore::open(&layout);
        assert_eq!(store.load("c2").unwrap(), Some(c2.clone()));
        let index = store.load_index().unwrap();
        assert_eq!(index.commits.len(), 2);
        assert_eq!(index.commits["c2"].context_id, c2.context_id);

        let state = store.load_local_state().unwrap();
        assert_eq!(state.last_capture.unwrap().commit, "c2");
        let history = &state.session_history["s"];
        assert_eq!(history.first_seen_commit, "c1");
        assert_eq!(history.capture_count, 2);

        let storage = open_context_storage(config.storage.backend, &layout).unwrap();
        let context = storage.fetch(&c2.context_id).unwrap().unwrap();
        assert_eq!(context.lines().count(), 14);
    }

    #[test]
    fn test_merge_commit_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        append_messages(&layout.sessions_dir, "s", 0, 2);
        let primary = FakeVcs::new();
        primary.add_commit("a", &[], None);
        primary.add_commit("b", &[], None);
        primary.add_commit("m", &["a", "b"], None);
        let snapshot = FakeVcs::with_root();

        let report = capture(&primary, &snapshot, &layout, &Config::default()).unwrap();

        assert!(matches!(report, CaptureReport::SkippedMergeCommit { ref commit_sha } if commit_sha == "m"));
        assert!(!layout.snapshots_dir.exists());
        assert_eq!(snapshot.commits().len(), 1);
    }

    #[test]
    fn test_no_sessions_still_commits_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        let primary = FakeVcs::new();
        primary.add_commit("c1", &[], None);
        let snapshot = FakeVcs::with_root();
        snapshot.write_file("stale.jsonl", "changed");

        let (metadata, committed) =
            captured(capture(&primary, &snapshot, &layout, &Config::default()).unwrap());

        assert!(metadata.is_none());
        assert_eq!(committed, SnapshotCommit::Committed);
        assert!(!layout.snapshots_dir.exists());
        assert!(!layout.state_file().exists());
    }

    #[test]
    fn test_sessions_older_than_parent_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        append_messages(&layout.sessions_dir, "s", 0, 3);
        let primary = FakeVcs::new();
        let future = Utc::now() + chrono::Duration::days(1);
        primary.add_commit("c1", &[], Some(future));
        primary.add_commit("c2", &["c1"], None);
        let snapshot = FakeVcs::new();

        let (metadata, _) =
            captured(capture(&primary, &snapshot, &layout, &Config::default()).unwrap());
        assert!(metadata.is_none());

        let mut config = Config::default();
        config.capture.only_since_parent = false;
        let (metadata, _) = captured(capture(&primary, &snapshot, &layout, &config).unwrap());
        assert_eq!(metadata.unwrap().total_messages, 3);
    }

    #[test]
    fn test_snapshot_commit_is_tagged_and_marked() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        append_messages(&layout.sessions_dir, "s", 0, 2);
        let primary = FakeVcs::new();
        primary.add_commit("c1", &[], None);
        let snapshot = FakeVcs::with_root();
        snapshot.write_file("s.jsonl", "two messages");

        let (_, committed) =
            captured(capture(&primary, &snapshot, &layout, &Config::default()).unwrap());

        assert_eq!(committed, SnapshotCommit::Committed);
        let head = snapshot.head().unwrap();
        let commits = snapshot.commits();
        assert_eq!(commits.last().unwrap().message, "Context for main repo commit c1");
        assert_eq!(snapshot.tag("cc-context/c1"), Some(head));
        assert_eq!(snapshot.config_get(SYNCED_KEY).unwrap().as_deref(), Some("c1"));

        // Nothing new to commit the second time round
        let (_, again) =
            captured(capture(&primary, &snapshot, &layout, &Config::default()).unwrap());
        assert_eq!(again, SnapshotCommit::Clean);
    }

    #[test]
    fn test_snapshot_commit_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        append_messages(&layout.sessions_dir, "s", 0, 2);
        let primary = FakeVcs::new();
        primary.add_commit("c1", &[], None);
        let snapshot = FakeVcs::with_root();
        snapshot.fail("commit");

        let (metadata, committed) =
            captured(capture(&primary, &snapshot, &layout, &Config::default()).unwrap());

        assert!(metadata.is_some());
        assert!(matches!(committed, SnapshotCommit::Failed(_)));
        assert!(SnapshotStore::open(&layout).load("c1").unwrap().is_some());
    }

    #[test]
    fn test_capture_without_commits_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        let result = capture(&FakeVcs::new(), &FakeVcs::new(), &layout, &Config::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_init_snapshot_repo() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        append_messages(&layout.sessions_dir, "s", 0, 1);
        let snapshot = FakeVcs::new();

        let report = init_snapshot_repo(&snapshot, &layout).unwrap();

        assert_eq!(report, InitReport::Initialized { sessions: 1 });
        assert!(snapshot.is_initialized());
        assert_eq!(
            snapshot.config_get("user.email").unwrap().as_deref(),
            Some("cc-context@localhost")
        );
        let commits = snapshot.commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, INITIAL_COMMIT_MESSAGE);
        assert_eq!(snapshot.root_commit().unwrap(), Some(commits[0].id.clone()));

        assert_eq!(
            init_snapshot_repo(&snapshot, &layout).unwrap(),
            InitReport::AlreadyInitialized
        );
    }

    #[test]
    fn test_init_keeps_existing_identity() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(&dir);
        let snapshot = FakeVcs::new();
        snapshot.set_author("me@example.com");

        init_snapshot_repo(&snapshot, &layout).unwrap();

        assert_eq!(snapshot.config_get("user.email").unwrap(), None);
        assert_eq!(snapshot.commits().len(), 1);
    }
}
