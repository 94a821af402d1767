//! Checkout sync command implementation (post-checkout hook)

use anyhow::Result;

use crate::cli::Workspace;
use crate::config::Config;
use crate::sync::{
    short_sha, AbortReason, CheckoutKind, CheckoutSynchronizer, SkipReason, SyncOutcome,
    TargetSource,
};

pub fn run(config: &Config, old_sha: &str, new_sha: &str, checkout_kind: &str) -> Result<()> {
    let kind = CheckoutKind::from_flag(checkout_kind);
    if kind == CheckoutKind::File {
        return Ok(());
    }

    let ws = Workspace::discover(config)?;
    let outcome = CheckoutSynchronizer::new(&ws.primary, &ws.snapshot).run(old_sha, new_sha, kind);

    match outcome {
        SyncOutcome::Skipped(SkipReason::FileCheckout) => {}
        SyncOutcome::Skipped(SkipReason::NotInitialized) => {
            println!("Note: Claude sessions repo not initialized. Run 'cc-context init' to enable session sync.");
        }
        SyncOutcome::AlreadySynced => {
            tracing::debug!("sessions already synced to {}", new_sha);
        }
        SyncOutcome::Aborted {
            reason,
            stashed,
            warnings,
        } => {
            header(old_sha, new_sha, stashed, &warnings);
            match reason {
                AbortReason::NoTarget => {
                    println!("Error: Could not find initial commit in Claude repo");
                }
                AbortReason::CheckoutFailed { target, error } => {
                    println!("Error: Failed to checkout Claude commit {}", short_sha(&target));
                    tracing::debug!("checkout error: {}", error);
                }
            }
        }
        SyncOutcome::Completed {
            target_source,
            stashed,
            restored,
            warnings,
            ..
        } => {
            header(old_sha, new_sha, stashed, &warnings);
            if target_source == TargetSource::Root {
                println!(
                    "No sessions found for commit {}, checking out initial state",
                    short_sha(new_sha)
                );
            }
            println!("✓ Checked out Claude sessions for {}", short_sha(new_sha));
            match restored {
                Some(reference) => println!("✓ Restored sessions from {}", reference),
                None => println!("No previous session state to restore"),
            }
        }
    }

    Ok(())
}

fn header(old_sha: &str, new_sha: &str, stashed: bool, warnings: &[String]) {
    println!(
        "Syncing Claude sessions: {} → {}",
        short_sha(old_sha),
        short_sha(new_sha)
    );
    if stashed {
        println!("Stashed current sessions for {}", short_sha(old_sha));
    }
    for warning in warnings {
        println!("Warning: {}", warning);
    }
}
