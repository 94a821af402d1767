//! Command implementations
//!
//! `capture` and `checkout-sync` run inside git hooks and go through
//! [`hook_boundary`]; the rest are administrative and report errors normally.

pub mod capture;
pub mod checkout_sync;
pub mod init;
pub mod list;
pub mod restore;
pub mod show;
pub mod status;

use anyhow::{Context, Result};
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;

use crate::config::Config;
use crate::paths::Layout;
use crate::store::{SnapshotMetadata, SnapshotStore};
use crate::vcs::{Git, VcsBackend};

/// The primary repo containing the current directory, plus its session repo
pub struct Workspace {
    pub primary: Git,
    pub snapshot: Git,
    pub layout: Layout,
}

impl Workspace {
    pub fn discover(config: &Config) -> Result<Self> {
        let cwd = std::env::current_dir().context("reading current directory")?;
        let primary = Git::discover(&cwd).context("Not in a git repository")?;
        let layout = Layout::new(primary.root(), config);
        let snapshot = Git::new(&layout.sessions_dir);
        Ok(Self {
            primary,
            snapshot,
            layout,
        })
    }

    pub fn store(&self) -> SnapshotStore {
        SnapshotStore::open(&self.layout)
    }

    /// Find the snapshot for `commit`, which may be any revision the primary
    /// repo understands or a prefix of a captured sha
    pub fn find_snapshot(&self, commit: &str) -> Result<Option<SnapshotMetadata>> {
        let store = self.store();
        if let Some(sha) = self.primary.rev_parse(commit).ok().flatten() {
            if let Some(meta) = store.load(&sha)? {
                return Ok(Some(meta));
            }
        }

        let index = store.load_index()?;
        let matches: Vec<&String> = index
            .commits
            .keys()
            .filter(|sha| sha.starts_with(commit))
            .collect();
        match matches.as_slice() {
            [sha] => store.load(sha),
            [] => Ok(None),
            _ => anyhow::bail!("Commit prefix '{}' is ambiguous", commit),
        }
    }
}

/// Run a hook command. Errors and panics are logged and never fail the
/// surrounding git operation.
pub fn hook_boundary<F>(name: &str, f: F) -> ExitCode
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!("{} failed: {:#}", name, e);
            eprintln!("Error in {}: {:#}", name, e);
        }
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("{} panicked: {}", name, detail);
            eprintln!("Error in {}: {}", name, detail);
        }
    }
    ExitCode::SUCCESS
}
