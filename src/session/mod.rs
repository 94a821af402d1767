//! Session discovery
//!
//! A session is one raw JSONL log the assistant writes into the per-worktree
//! directory `<base>/<encoded-worktree>/<session_id>.jsonl`. Sessions are
//! rediscovered on every run; nothing caches them between invocations.

mod parse;

pub use parse::{
    parse_log, to_jsonl, validate, Message, MessageKind, ParseWarning, Parsed,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// One raw session log on disk
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub path: PathBuf,
    pub modified_time: DateTime<Utc>,
    /// SHA-256 of the full file, hex encoded
    pub content_hash: String,
    /// Filled in once the log has been parsed
    pub message_count: usize,
}

/// SHA-256 over the file contents, read in 4 KiB chunks
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Scan `storage_root` (non-recursively) for `*.jsonl` logs.
///
/// Logs modified at or before `after` are skipped. Results are sorted by
/// modification time, oldest first. A missing root yields no sessions.
pub fn discover(storage_root: &Path, after: Option<DateTime<Utc>>) -> Result<Vec<Session>> {
    let mut sessions = vec![];

    if !storage_root.is_dir() {
        return Ok(sessions);
    }

    let pattern = glob::Pattern::escape(&storage_root.to_string_lossy()) + "/*.jsonl";

    for entry in glob::glob(&pattern).context("invalid session glob")? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("skipping unreadable session entry: {}", e);
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }

        let modified_time: DateTime<Utc> = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .with_context(|| format!("reading mtime of {}", path.display()))?
            .into();

        if let Some(after) = after {
            if modified_time <= after {
                continue;
            }
        }

        let session_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        sessions.push(Session {
            session_id,
            content_hash: hash_file(&path)?,
            path,
            modified_time,
            message_count: 0,
        });
    }

    sessions.sort_by(|a, b| {
        a.modified_time
            .cmp(&b.modified_time)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });

    Ok(sessions)
}
