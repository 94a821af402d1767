//! On-disk layout for one primary working tree

use std::path::{Path, PathBuf};

use crate::Config;

/// Encode an absolute worktree path into a single directory name.
///
/// `/home/me/app` becomes `-home-me-app`, the naming the assistant uses for
/// its per-project session directories.
pub fn encode_path(worktree: &Path) -> String {
    let abs = if worktree.is_absolute() {
        worktree.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(worktree))
            .unwrap_or_else(|_| worktree.to_path_buf())
    };
    abs.to_string_lossy()
        .chars()
        .map(|c| if std::path::is_separator(c) { '-' } else { c })
        .collect()
}

/// Resolved locations for one worktree
#[derive(Debug, Clone)]
pub struct Layout {
    pub worktree: PathBuf,
    /// Raw session logs; also the snapshot repo's working tree
    pub sessions_dir: PathBuf,
    pub snapshots_dir: PathBuf,
    pub context_dir: PathBuf,
}

impl Layout {
    pub fn new(worktree: &Path, config: &Config) -> Self {
        let sessions_dir = config.sessions_base().join(encode_path(worktree));
        Self {
            worktree: worktree.to_path_buf(),
            sessions_dir,
            snapshots_dir: worktree.join(&config.storage.snapshots_dir),
            context_dir: worktree.join(&config.storage.context_dir),
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.context_dir.join("state.json")
    }

    pub fn contexts_dir(&self) -> PathBuf {
        self.context_dir.join("contexts")
    }

    pub fn contexts_db(&self) -> PathBuf {
        self.context_dir.join("contexts.db")
    }
}
