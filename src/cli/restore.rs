//! Restore command implementation
//!
//! Prints a captured conversation, or writes it to a file outside the
//! session directory. Anything written into the session directory would be
//! picked up as a new session by the next capture.

use anyhow::{anyhow, bail, Result};
use std::fs;
use std::path::Path;

use crate::cli::Workspace;
use crate::config::Config;
use crate::paths::Layout;
use crate::store::{open_context_storage, write_atomic};
use crate::sync::short_sha;

pub fn run(config: &Config, commit: &str, output: Option<&Path>) -> Result<()> {
    let ws = Workspace::discover(config)?;

    let meta = ws
        .find_snapshot(commit)?
        .ok_or_else(|| anyhow!("No captured context for commit '{}'", commit))?;

    let storage = open_context_storage(config.storage.backend, &ws.layout)?;
    let jsonl = storage
        .fetch(&meta.context_id)?
        .ok_or_else(|| anyhow!("Context {} is missing from storage", meta.context_id))?;

    let Some(path) = output else {
        println!("{}", jsonl);
        return Ok(());
    };

    write_context(&ws.layout, path, &jsonl)?;
    println!(
        "✓ Restored context {} for commit {}",
        meta.context_id,
        short_sha(&meta.commit_sha)
    );
    println!("  {}", path.display());

    Ok(())
}

/// Write a context document to `path`, refusing the session directory
pub fn write_context(layout: &Layout, path: &Path, jsonl: &str) -> Result<()> {
    if lands_in(&layout.sessions_dir, path) {
        bail!(
            "Refusing to write into the session directory {}; it would be captured as a new session",
            layout.sessions_dir.display()
        );
    }
    let mut data = jsonl.as_bytes().to_vec();
    data.push(b'\n');
    write_atomic(path, &data)
}

/// Whether `path` would sit directly in `dir` (discovery is non-recursive)
fn lands_in(dir: &Path, path: &Path) -> bool {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), fs::canonicalize(dir)) {
        (Ok(a), Ok(b)) => a == b,
        _ => parent == dir,
    }
}
