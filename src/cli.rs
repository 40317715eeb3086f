//! # Command Line Interface
//!
//! Argument surface and run orchestration for ConfDiff.
//!
//! A run flows strictly downstream: probe the machines once, then for every
//! configuration file fetch → parse → render, with each stage joined before
//! the next begins. Per-machine and per-file failures shrink the comparison
//! and log a warning; only usage errors (no files, a bad machine name, an
//! empty delimiter) are fatal, and those are caught before any network
//! activity.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use dialoguer::Password;
use tokio::task::JoinSet;
use tracing::warn;

use crate::diff;
use crate::fetch::{AuthMode, Fetcher};
use crate::parse::{self, ParsedConfig};
use crate::probe;
use crate::staging::{StagingArea, HOST_SEPARATOR};

/// The implicit machine name used when no `--machines` are given and files
/// are parsed straight off the local disk.
const LOCAL_HOST: &str = "localhost";

const DEFAULT_DELIMITER: &str = " ";

/// Command-line interface structure for ConfDiff.
#[derive(Parser, Debug)]
#[command(name = "confdiff")]
#[command(about = "Compare Unix configuration files across remote machines")]
#[command(version = "1.0.0")]
pub struct Cli {
    /// Absolute path(s) of the configuration file(s) to compare
    #[arg(value_name = "FILE", required = true)]
    pub config_files: Vec<PathBuf>,

    /// Comma separated list of machines to compare the configuration file
    /// from; omit to parse the files locally
    #[arg(short, long, value_delimiter = ',', value_name = "HOST")]
    pub machines: Option<Vec<String>>,

    /// Force a delimiter separating the key/value pair. Defaults to a space
    #[arg(short, long)]
    pub delimiter: Option<String>,

    /// User to authenticate against remote machines
    #[arg(short, long)]
    pub user: Option<String>,

    /// Prompt once for a password and use it for all machines
    #[arg(short, long)]
    pub password: bool,

    /// Disable colored output
    #[arg(short, long)]
    pub nocolor: bool,

    /// Include per-machine transfer warnings with the output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Execute one comparison run.
pub async fn run(cli: Cli) -> Result<()> {
    let delimiter = cli
        .delimiter
        .clone()
        .unwrap_or_else(|| DEFAULT_DELIMITER.to_string());
    if delimiter.is_empty() {
        anyhow::bail!("delimiter must not be empty");
    }
    let color = !cli.nocolor;

    let machines = cli.machines.clone().unwrap_or_default();
    validate_machines(&machines)?;

    if machines.is_empty() {
        return run_local(&cli.config_files, &delimiter, color);
    }

    let user = cli.user.clone().unwrap_or_else(whoami::username);
    let auth = if cli.password {
        let password = Password::new().with_prompt("Password").interact()?;
        AuthMode::SharedPassword(password)
    } else {
        // SSH keys are already propagated across the machines.
        AuthMode::KeyBased
    };

    let report = probe::probe(&machines).await;
    if !report.unreachable.is_empty() {
        warn!(
            "excluded {} unreachable machine(s): {}",
            report.unreachable.len(),
            report.unreachable.join(", ")
        );
    }
    println!(
        "Proceeding on {} machines: {}",
        report.available.len(),
        report.available.join(", ")
    );
    if report.available.is_empty() {
        warn!("no machines survived probing; nothing to compare");
        return Ok(());
    }

    let fetcher = Fetcher::new(user, auth, cli.verbose);
    for config_file in &cli.config_files {
        compare_one_file(&fetcher, config_file, &report.available, &delimiter, color).await;
    }

    Ok(())
}

/// Machine names must not contain the staging-filename separator.
fn validate_machines(machines: &[String]) -> Result<()> {
    for machine in machines {
        if machine.trim().is_empty() {
            anyhow::bail!("empty machine name in --machines list");
        }
        if machine.contains(HOST_SEPARATOR) {
            anyhow::bail!(
                "invalid character '{}' in machine name: {}",
                HOST_SEPARATOR,
                machine
            );
        }
    }
    Ok(())
}

/// Fetch, parse, and render one configuration file. Failures here reduce
/// the comparison set but never abort the run; the staging directory is
/// removed on every path out.
async fn compare_one_file(
    fetcher: &Fetcher,
    config_file: &Path,
    hosts: &[String],
    delimiter: &str,
    color: bool,
) {
    let staging = match StagingArea::new() {
        Ok(staging) => staging,
        Err(e) => {
            warn!(
                "could not create staging directory for {}: {}",
                config_file.display(),
                e
            );
            return;
        }
    };

    let staged = fetcher.fetch_all(config_file, hosts, &staging).await;
    if staged.is_empty() {
        warn!("no copies of {} could be fetched", config_file.display());
        staging.close();
        return;
    }

    let configs = parse_staged(staged, delimiter).await;
    if !configs.is_empty() {
        print!(
            "{}",
            diff::render(config_file, &configs, color, configs.len())
        );
    }

    staging.close();
}

/// Parse every staged copy, one task per file, joining them all before any
/// rendering happens. Machines whose copy cannot be read are dropped.
async fn parse_staged(staged: BTreeMap<String, PathBuf>, delimiter: &str) -> Vec<ParsedConfig> {
    let mut tasks = JoinSet::new();
    for (host, path) in staged {
        let delimiter = delimiter.to_string();
        tasks.spawn_blocking(move || parse::parse_file(&path, &host, &delimiter));
    }

    let mut configs = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(config)) => configs.push(config),
            Ok(Err(e)) => warn!("dropping machine from comparison: {}", e),
            Err(e) => warn!("parse task failed: {}", e),
        }
    }

    // Stable output regardless of task completion order.
    configs.sort_by(|a, b| a.host.cmp(&b.host));
    configs
}

/// Local mode: parse each file off the local disk as a single implicit
/// machine. Single-host runs never tag unique values.
fn run_local(config_files: &[PathBuf], delimiter: &str, color: bool) -> Result<()> {
    for config_file in config_files {
        match parse::parse_file(config_file, LOCAL_HOST, delimiter) {
            Ok(config) => print!("{}", diff::render(config_file, &[config], color, 1)),
            Err(e) => warn!("skipping {}: {}", config_file.display(), e),
        }
    }
    Ok(())
}
