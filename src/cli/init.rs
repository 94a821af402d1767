//! Init command implementation

use anyhow::Result;

use crate::capture::{init_snapshot_repo, InitReport};
use crate::cli::Workspace;
use crate::config::Config;
use crate::vcs::VcsBackend;

pub fn run(config: &Config) -> Result<()> {
    let ws = Workspace::discover(config)?;
    println!("Main repository: {}", ws.primary.root().display());
    println!("Claude sessions directory: {}", ws.layout.sessions_dir.display());

    match init_snapshot_repo(&ws.snapshot, &ws.layout)? {
        InitReport::AlreadyInitialized => {
            println!();
            println!("✓ Claude sessions repo is already initialized!");
            println!();
            println!("You can now:");
            println!("  • Install the capture and checkout-sync hooks");
            println!("  • Run 'cc-context capture' to capture current sessions");
        }
        InitReport::Initialized { sessions } => {
            println!();
            println!("{}", "=".repeat(60));
            println!("🎉 Claude sessions repo initialized successfully!");
            println!("{}", "=".repeat(60));
            println!();
            if sessions > 0 {
                println!("✓ {} existing session(s) committed to initial state", sessions);
                println!();
            }
            println!("Next steps:");
            println!("  1. Call 'cc-context capture' from a post-commit hook");
            println!("  2. Call 'cc-context checkout-sync \"$@\"' from a post-checkout hook");
        }
    }

    Ok(())
}
