//! Show command implementation

use anyhow::{Context, Result};

use crate::cli::Workspace;
use crate::config::Config;
use crate::merge::message_stats;
use crate::session::Message;
use crate::store::open_context_storage;
use crate::sync::short_sha;

pub fn run(config: &Config, commit: &str) -> Result<()> {
    let ws = Workspace::discover(config)?;

    let meta = match ws.find_snapshot(commit)? {
        Some(m) => m,
        None => {
            println!("No captured context for commit '{}'.", commit);
            return Ok(());
        }
    };

    println!("\n{}", "=".repeat(80));
    println!("Commit: {} | Context: {}", short_sha(&meta.commit_sha), meta.context_id);
    if let Some(parent) = &meta.parent_commit {
        println!("Parent: {}", short_sha(parent));
    }
    println!("Author: {} | Captured: {}", meta.author, meta.timestamp);
    for s in &meta.sessions {
        println!(
            "  {} - {} messages ({:+} new{})",
            s.session_id,
            s.message_count,
            s.new_messages,
            if s.continued_from_parent { ", continued" } else { "" }
        );
    }
    println!("{}", "=".repeat(80));

    let storage = open_context_storage(config.storage.backend, &ws.layout)?;
    let Some(jsonl) = storage.fetch(&meta.context_id)? else {
        println!("\nContext {} is missing from storage.", meta.context_id);
        return Ok(());
    };

    let mut messages = vec![];
    for (idx, line) in jsonl.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let msg: Message = serde_json::from_str(line)
            .with_context(|| format!("context {} line {}", meta.context_id, idx + 1))?;
        messages.push(msg);
    }

    for msg in &messages {
        println!("\n[{}] ({})", msg.kind.as_str().to_uppercase(), msg.timestamp);
        println!("{}", msg.content);
        println!("{}", "-".repeat(40));
    }

    let stats = message_stats(&messages);
    println!(
        "\n{} messages: {} user, {} assistant, {} system",
        stats.total, stats.user, stats.assistant, stats.system
    );

    Ok(())
}
