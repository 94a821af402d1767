//! List command implementation

use anyhow::Result;
use chrono::DateTime;

use crate::cli::Workspace;
use crate::config::Config;
use crate::sync::short_sha;

pub fn run(config: &Config) -> Result<()> {
    let ws = Workspace::discover(config)?;
    let index = ws.store().load_index()?;

    if index.commits.is_empty() {
        println!("No captured commits. Run 'cc-context capture' after a commit first.");
        return Ok(());
    }

    let mut entries: Vec<_> = index.commits.iter().collect();
    entries.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp));

    println!(
        "{:<10} {:<14} {:<10} {:<10} {}",
        "Commit", "Context", "Sessions", "Messages", "Captured"
    );
    println!("{}", "-".repeat(72));

    for (sha, entry) in entries {
        println!(
            "{:<10} {:<14} {:<10} {:<10} {}",
            short_sha(sha),
            entry.context_id,
            entry.session_count,
            entry.message_count,
            format_captured(&entry.timestamp),
        );
    }

    Ok(())
}

/// `2024-01-02 10:30` for RFC 3339 stamps; anything else is shown as stored
fn format_captured(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}
