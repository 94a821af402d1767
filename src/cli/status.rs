//! Status command implementation

use anyhow::Result;

use crate::cli::Workspace;
use crate::config::{Config, StorageBackend};
use crate::session;
use crate::sync::{short_sha, SYNCED_KEY};
use crate::vcs::VcsBackend;

pub fn run(config: &Config) -> Result<()> {
    let ws = Workspace::discover(config)?;
    let store = ws.store();

    println!("Main repository:     {}", ws.primary.root().display());
    println!("Sessions directory:  {}", ws.layout.sessions_dir.display());
    println!("Snapshots:           {}", ws.layout.snapshots_dir.display());
    println!(
        "Context storage:     {}",
        match config.storage.backend {
            StorageBackend::File => "file",
            StorageBackend::Sqlite => "sqlite",
        }
    );

    if ws.snapshot.is_initialized() {
        let synced = ws
            .snapshot
            .config_get(SYNCED_KEY)
            .unwrap_or_else(|e| {
                tracing::warn!("Could not read sync marker: {}", e);
                None
            })
            .map(|sha| short_sha(&sha).to_string())
            .unwrap_or_else(|| "-".to_string());
        let dirty = ws.snapshot.has_uncommitted_changes().unwrap_or(false);
        println!("Snapshot repo:       initialized (synced to {})", synced);
        if dirty {
            println!("                     uncommitted session changes present");
        }
    } else {
        println!("Snapshot repo:       not initialized (run 'cc-context init')");
    }

    let sessions = session::discover(&ws.layout.sessions_dir, None)?;
    println!("Session logs:        {}", sessions.len());

    let index = store.load_index()?;
    println!("Captured commits:    {}", index.commits.len());

    match store.load_local_state()?.last_capture {
        Some(last) => println!(
            "Last capture:        {} ({}) at {}",
            short_sha(&last.commit),
            last.context_id,
            last.timestamp
        ),
        None => println!("Last capture:        -"),
    }

    Ok(())
}
