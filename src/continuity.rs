//! Compare current sessions against the parent commit's snapshot
//!
//! A session is "continued" when its id appears in the parent snapshot. Only
//! message counts are compared, never message content.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::session::Session;
use crate::store::{SessionSummary, SnapshotMetadata, SnapshotStore};

/// How to count new messages for a continued session whose hash is unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnchangedPolicy {
    /// Report the full message count
    #[default]
    FullCount,
    /// Report zero new messages
    ZeroDelta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuityRecord {
    pub session_id: String,
    pub continued_from_parent: bool,
    pub message_count: usize,
    /// Negative when the log shrank since the parent
    pub new_messages: i64,
    pub previous_hash: Option<String>,
}

/// Load the parent snapshot (if any) and compare against it
pub fn analyze(
    store: &SnapshotStore,
    sessions: &[Session],
    parent_commit: Option<&str>,
    policy: UnchangedPolicy,
) -> Result<Vec<ContinuityRecord>> {
    let parent = match parent_commit {
        Some(sha) => store.load(sha)?,
        None => None,
    };
    if parent_commit.is_some() && parent.is_none() {
        tracing::debug!("no snapshot for parent commit, treating all sessions as new");
    }
    Ok(compare(sessions, parent.as_ref(), policy))
}

/// One record per session, in input order
pub fn compare(
    sessions: &[Session],
    parent: Option<&SnapshotMetadata>,
    policy: UnchangedPolicy,
) -> Vec<ContinuityRecord> {
    let by_id: HashMap<&str, &SessionSummary> = parent
        .map(|p| {
            p.sessions
                .iter()
                .map(|s| (s.session_id.as_str(), s))
                .collect()
        })
        .unwrap_or_default();

    sessions
        .iter()
        .map(|session| {
            let count = session.message_count as i64;
            let previous = by_id.get(session.session_id.as_str());

            let new_messages = match previous {
                None => count,
                Some(prev) if prev.content_hash != session.content_hash => {
                    count - prev.message_count as i64
                }
                Some(_) => match policy {
                    UnchangedPolicy::FullCount => count,
                    UnchangedPolicy::ZeroDelta => 0,
                },
            };

            ContinuityRecord {
                session_id: session.session_id.clone(),
                continued_from_parent: previous.is_some(),
                message_count: session.message_count,
                new_messages,
                previous_hash: previous.map(|p| p.content_hash.clone()),
            }
        })
        .collect()
}
