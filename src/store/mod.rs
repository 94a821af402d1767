//! Snapshot metadata, commit index and local sync state
//!
//! Layout under the snapshots directory:
//! - `<commit_sha>/metadata.json` - one document per captured commit
//! - `index.json` - commit -> summary, for lookups without opening metadata
//!
//! Local sync state lives in `<context_dir>/state.json`.
//!
//! Every mutation goes through [`SnapshotStore`], which holds an in-process
//! mutex plus an exclusive file lock for the duration of the write. Documents
//! are rewritten whole and replaced atomically.

mod context;
mod schema;
mod sqlite;

pub use context::{open_context_storage, ContextStorage, FileContextStorage};
pub use schema::SCHEMA;
pub use sqlite::SqliteContextStorage;

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::continuity::ContinuityRecord;
use crate::paths::Layout;
use crate::session::Session;

// ============================================
// DOCUMENT TYPES
// ============================================

/// Per-session line in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub new_messages: i64,
    pub continued_from_parent: bool,
    #[serde(alias = "file_hash")]
    pub content_hash: String,
}

/// Captured state of all sessions as of one primary commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub commit_sha: String,
    pub parent_commit: Option<String>,
    pub timestamp: String,
    pub author: String,
    pub context_id: String,
    pub sessions: Vec<SessionSummary>,
    pub total_messages: usize,
    pub new_messages_since_parent: i64,
}

impl SnapshotMetadata {
    /// Build the snapshot for `commit_sha`. `sessions` and `continuity` are
    /// paired by position.
    pub fn create(
        commit_sha: &str,
        parent_commit: Option<&str>,
        context_id: &str,
        sessions: &[Session],
        continuity: &[ContinuityRecord],
        author: Option<&str>,
    ) -> Self {
        let entries: Vec<SessionSummary> = sessions
            .iter()
            .zip(continuity)
            .map(|(session, cont)| SessionSummary {
                session_id: session.session_id.clone(),
                message_count: cont.message_count,
                new_messages: cont.new_messages,
                continued_from_parent: cont.continued_from_parent,
                content_hash: session.content_hash.clone(),
            })
            .collect();

        Self {
            commit_sha: commit_sha.to_string(),
            parent_commit: parent_commit.map(String::from),
            timestamp: now_stamp(),
            author: author.unwrap_or("unknown").to_string(),
            context_id: context_id.to_string(),
            total_messages: entries.iter().map(|e| e.message_count).sum(),
            new_messages_since_parent: entries.iter().map(|e| e.new_messages).sum(),
            sessions: entries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub has_context: bool,
    pub context_id: String,
    pub message_count: usize,
    pub session_count: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    #[serde(default)]
    pub commits: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCapture {
    pub commit: String,
    pub context_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHistory {
    pub first_seen_commit: String,
    pub last_captured_commit: String,
    pub capture_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    #[serde(default)]
    pub last_capture: Option<LastCapture>,
    #[serde(default)]
    pub session_history: BTreeMap<String, SessionHistory>,
}

/// Generate a fresh context id (`ctx-` + 8 hex chars)
pub fn generate_context_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("ctx-{}", &id[..8])
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ============================================
// STORE
// ============================================

pub struct SnapshotStore {
    snapshots_dir: PathBuf,
    state_file: PathBuf,
    writer: Mutex<()>,
}

/// Held for the duration of one write
struct WriteGuard<'a> {
    _local: MutexGuard<'a, ()>,
    _file: File,
}

impl SnapshotStore {
    pub fn new(snapshots_dir: impl Into<PathBuf>, state_file: impl Into<PathBuf>) -> Self {
        Self {
            snapshots_dir: snapshots_dir.into(),
            state_file: state_file.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn open(layout: &Layout) -> Self {
        Self::new(&layout.snapshots_dir, layout.state_file())
    }

    pub fn snapshots_dir(&self) -> &Path {
        &self.snapshots_dir
    }

    fn metadata_path(&self, commit_sha: &str) -> PathBuf {
        self.snapshots_dir.join(commit_sha).join("metadata.json")
    }

    fn index_path(&self) -> PathBuf {
        self.snapshots_dir.join("index.json")
    }

    fn lock(&self) -> Result<WriteGuard<'_>> {
        let local = self
            .writer
            .lock()
            .map_err(|_| anyhow!("snapshot store writer lock poisoned"))?;

        fs::create_dir_all(&self.snapshots_dir)
            .with_context(|| format!("creating {}", self.snapshots_dir.display()))?;
        let lock_path = self.snapshots_dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("opening lock file {}", lock_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("locking {}", lock_path.display()))?;

        Ok(WriteGuard {
            _local: local,
            _file: file,
        })
    }

    // ============================================
    // METADATA
    // ============================================

    /// Write the metadata document for `commit_sha`, replacing any previous one
    pub fn save(&self, commit_sha: &str, metadata: &SnapshotMetadata) -> Result<PathBuf> {
        let _guard = self.lock()?;
        self.save_locked(commit_sha, metadata)
    }

    fn save_locked(&self, commit_sha: &str, metadata: &SnapshotMetadata) -> Result<PathBuf> {
        let path = self.metadata_path(commit_sha);
        write_json(&path, metadata)?;
        Ok(path)
    }

    pub fn load(&self, commit_sha: &str) -> Result<Option<SnapshotMetadata>> {
        read_json(&self.metadata_path(commit_sha))
    }

    // ============================================
    // INDEX
    // ============================================

    pub fn load_index(&self) -> Result<Index> {
        Ok(read_json(&self.index_path())?.unwrap_or_default())
    }

    pub fn update_index(&self, commit_sha: &str, metadata: &SnapshotMetadata) -> Result<()> {
        let _guard = self.lock()?;
        self.update_index_locked(commit_sha, metadata)
    }

    fn update_index_locked(&self, commit_sha: &str, metadata: &SnapshotMetadata) -> Result<()> {
        let mut index = self.load_index()?;
        index.commits.insert(
            commit_sha.to_string(),
            IndexEntry {
                has_context: true,
                context_id: metadata.context_id.clone(),
                message_count: metadata.total_messages,
                session_count: metadata.sessions.len(),
                timestamp: metadata.timestamp.clone(),
            },
        );
        write_json(&self.index_path(), &index)
    }

    // ============================================
    // LOCAL STATE
    // ============================================

    pub fn load_local_state(&self) -> Result<LocalState> {
        Ok(read_json(&self.state_file)?.unwrap_or_default())
    }

    pub fn update_local_state(
        &self,
        commit_sha: &str,
        context_id: &str,
        sessions: &[Session],
    ) -> Result<()> {
        let _guard = self.lock()?;
        self.update_local_state_locked(commit_sha, context_id, sessions)
    }

    fn update_local_state_locked(
        &self,
        commit_sha: &str,
        context_id: &str,
        sessions: &[Session],
    ) -> Result<()> {
        let mut state = self.load_local_state()?;

        state.last_capture = Some(LastCapture {
            commit: commit_sha.to_string(),
            context_id: context_id.to_string(),
            timestamp: now_stamp(),
        });

        for session in sessions {
            state
                .session_history
                .entry(session.session_id.clone())
                .and_modify(|h| {
                    h.last_captured_commit = commit_sha.to_string();
                    h.capture_count += 1;
                })
                .or_insert_with(|| SessionHistory {
                    first_seen_commit: commit_sha.to_string(),
                    last_captured_commit: commit_sha.to_string(),
                    capture_count: 1,
                });
        }

        write_json(&self.state_file, &state)
    }

    /// Save metadata, index entry and local state as one locked write
    pub fn record_capture(&self, metadata: &SnapshotMetadata, sessions: &[Session]) -> Result<()> {
        let _guard = self.lock()?;
        self.save_locked(&metadata.commit_sha, metadata)?;
        self.update_index_locked(&metadata.commit_sha, metadata)?;
        self.update_local_state_locked(&metadata.commit_sha, &metadata.context_id, sessions)
    }
}

// ============================================
// JSON HELPERS
// ============================================

/// Read a JSON document, `None` if it doesn't exist
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(s) => {
            let val =
                serde_json::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
            Ok(Some(val))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value)?;
    write_atomic(path, data.as_bytes()).with_context(|| format!("writing {}", path.display()))
}

/// Write to a temp file in the same directory, then rename over `path`
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}
