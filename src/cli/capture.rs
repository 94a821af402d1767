//! Capture command implementation (post-commit hook)

use anyhow::Result;

use crate::capture::{self, CaptureReport, SnapshotCommit};
use crate::cli::Workspace;
use crate::config::Config;
use crate::sync::short_sha;

pub fn run(config: &Config) -> Result<()> {
    let ws = Workspace::discover(config)?;
    let report = capture::capture(&ws.primary, &ws.snapshot, &ws.layout, config)?;

    let (commit_sha, metadata, warnings, snapshot) = match report {
        CaptureReport::SkippedMergeCommit { .. } => {
            println!("Skipping context capture: merge commit detected");
            return Ok(());
        }
        CaptureReport::Captured {
            commit_sha,
            metadata,
            warnings,
            snapshot,
        } => (commit_sha, metadata, warnings, snapshot),
    };

    match metadata {
        None => println!("No active Claude sessions found, skipping context capture"),
        Some(meta) => {
            println!("✓ Captured Claude context for commit {}", short_sha(&commit_sha));
            println!("  - {} session(s) merged", meta.sessions.len());
            println!(
                "  - {} total messages ({} new since parent)",
                meta.total_messages, meta.new_messages_since_parent
            );
            println!("  - Context ID: {}", meta.context_id);
            if !warnings.is_empty() {
                println!("  - {} unreadable line(s) skipped", warnings.len());
            }
        }
    }

    match snapshot {
        SnapshotCommit::NotInitialized => {
            println!("Note: Claude sessions repo not initialized. Run 'cc-context init' to enable session snapshots.")
        }
        SnapshotCommit::Committed => println!(
            "✓ Claude sessions committed for main repo commit {}",
            short_sha(&commit_sha)
        ),
        SnapshotCommit::Clean => {}
        SnapshotCommit::Failed(e) => eprintln!("Error: Failed to commit sessions: {}", e),
    }

    Ok(())
}
