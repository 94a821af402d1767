use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use cc_context::cli::{self, capture, checkout_sync, init, list, restore, show, status};
use cc_context::config::Config;

#[derive(Parser)]
#[command(name = "cc-context")]
#[command(about = "Keep AI assistant session logs in step with git history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "cc-context.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn the session directory into a snapshot repository
    Init,

    /// Capture sessions for HEAD (post-commit hook)
    Capture,

    /// Follow a checkout in the snapshot repository (post-checkout hook)
    CheckoutSync {
        /// Previous HEAD
        old_sha: String,
        /// New HEAD
        new_sha: String,
        /// 1 for a branch checkout, 0 for a file checkout
        checkout_kind: String,
    },

    /// Show capture and sync state
    Status,

    /// List captured commits
    List,

    /// Show the merged conversation captured for a commit
    Show {
        /// Commit (any revision or sha prefix)
        commit: String,
    },

    /// Print a captured conversation, or write it to a file
    Restore {
        /// Commit (any revision or sha prefix)
        commit: String,

        /// Write to this file instead of stdout (not inside the session directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    // Load config
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Using default config: {:#}", e);
            Config::default()
        }
    };

    match cli.command {
        Commands::Init => {
            init::run(&config)?;
        }
        Commands::Capture => {
            return Ok(cli::hook_boundary("capture", || capture::run(&config)));
        }
        Commands::CheckoutSync {
            old_sha,
            new_sha,
            checkout_kind,
        } => {
            return Ok(cli::hook_boundary("checkout-sync", || {
                checkout_sync::run(&config, &old_sha, &new_sha, &checkout_kind)
            }));
        }
        Commands::Status => {
            status::run(&config)?;
        }
        Commands::List => {
            list::run(&config)?;
        }
        Commands::Show { commit } => {
            show::run(&config, &commit)?;
        }
        Commands::Restore { commit, output } => {
            restore::run(&config, &commit, output.as_deref())?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Initialization
// ============================================================================

/// Logs go to stderr so hook output on stdout stays readable
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
