//! # ConfDiff CLI Application
//!
//! Main entry point for the ConfDiff configuration comparison utility.
//! Sets up logging, parses command line arguments, and hands the run off to
//! the orchestration in [`confdiff::cli`].

use anyhow::Result;
use clap::Parser;
use colored::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use confdiff::cli::{self, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confdiff=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Dropping the run future on interrupt tears down any staging
    // directories still in scope before the process exits.
    let outcome = tokio::select! {
        result = cli::run(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\nHalting");
            return Ok(());
        }
    };

    if let Err(e) = outcome {
        eprintln!(
            "{} {}\n{}",
            "Error:".red().bold(),
            e.to_string().red(),
            "Tip: Run with --help for usage information.".yellow()
        );
        std::process::exit(1);
    }
    Ok(())
}
