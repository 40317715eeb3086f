//! # Remote Fetch Pool
//!
//! Retrieves one configuration file from every available machine into the
//! staging area, over a bounded pool of transfer workers. Transfers run the
//! system `scp` so the user's existing SSH configuration applies; key-based
//! transfers run in batch mode, password transfers go through the
//! interactive session driver in [`crate::expect`].
//!
//! Every per-machine failure is converted to a log line and the machine is
//! dropped from the result map; nothing here aborts sibling transfers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use portable_pty::CommandBuilder;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::expect::{self, Outcome};
use crate::pool;
use crate::staging::StagingArea;

/// Please enjoy SSH connections responsibly.
const FETCH_WORKERS: usize = 5;
const CONNECT_TIMEOUT_SECS: u32 = 3;
const SESSION_TIMEOUT: Duration = Duration::from_secs(3);

/// How transfers authenticate against the remote machines.
#[derive(Clone)]
pub enum AuthMode {
    /// Non-interactive transfer; SSH keys are already propagated.
    KeyBased,
    /// One password, prompted once, reused read-only for every machine.
    SharedPassword(String),
}

/// Why a single (file, machine) transfer produced no staged copy.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error("password rejected")]
    BadPassword,
    #[error("permission denied")]
    PermissionDenied,
    #[error("remote file not found")]
    NotFound,
    #[error("transfer reported success but no staged copy exists")]
    MissingCopy,
    #[error(transparent)]
    Session(#[from] anyhow::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Shared, read-only context for all fetch workers in one run.
#[derive(Clone)]
pub struct Fetcher {
    user: String,
    auth: AuthMode,
    verbose: bool,
}

impl Fetcher {
    pub fn new(user: String, auth: AuthMode, verbose: bool) -> Self {
        Self {
            user,
            auth,
            verbose,
        }
    }

    /// Fetch `config_file` from every machine in `hosts` into `staging`.
    ///
    /// Returns a map containing exactly the machines whose staged copy
    /// exists on disk. The submitter blocks until the pool has drained every
    /// job, so the caller can parse immediately after this returns.
    pub async fn fetch_all(
        &self,
        config_file: &Path,
        hosts: &[String],
        staging: &StagingArea,
    ) -> BTreeMap<String, PathBuf> {
        let jobs: Vec<(String, PathBuf)> = hosts
            .iter()
            .map(|host| (host.clone(), staging.staged_path(config_file, host)))
            .collect();

        let worker_ctx = self.clone();
        let remote_path = config_file.to_path_buf();
        let results = pool::run_bounded(FETCH_WORKERS, jobs, move |(host, local)| {
            let ctx = worker_ctx.clone();
            let remote = remote_path.clone();
            async move {
                let outcome = ctx.fetch_one(&remote, &host, &local).await;
                (host, local, outcome)
            }
        })
        .await;

        let mut staged = BTreeMap::new();
        for (host, local, outcome) in results {
            match outcome {
                Ok(()) => {
                    debug!("staged {} from {}", local.display(), host);
                    staged.insert(host, local);
                }
                Err(FetchError::BadPassword) => warn!("your password failed on {}", host),
                Err(FetchError::PermissionDenied) => {
                    if self.verbose {
                        warn!("file inaccessible on {}", host);
                    }
                }
                Err(FetchError::NotFound) => {
                    if self.verbose {
                        warn!("file does not exist on {}", host);
                    }
                }
                Err(e) => warn!(
                    "could not fetch {} from {}: {}",
                    config_file.display(),
                    host,
                    e
                ),
            }
        }

        info!(
            "fetched {} of {} copies of {}",
            staged.len(),
            hosts.len(),
            config_file.display()
        );
        staged
    }

    async fn fetch_one(&self, remote: &Path, host: &str, local: &Path) -> Result<(), FetchError> {
        match &self.auth {
            AuthMode::KeyBased => self.transfer_with_keys(remote, host, local).await?,
            AuthMode::SharedPassword(password) => {
                self.transfer_with_password(remote, host, local, password)
                    .await?
            }
        }

        // Post-condition guard: only machines with a real staged copy make
        // it into the result map.
        if !local.exists() {
            return Err(FetchError::MissingCopy);
        }
        Ok(())
    }

    async fn transfer_with_keys(
        &self,
        remote: &Path,
        host: &str,
        local: &Path,
    ) -> Result<(), FetchError> {
        let output = Command::new("scp")
            .args(scp_args(&self.user, host, remote, local, true))
            .output()
            .await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if self.verbose {
                warn!("{} said: {}", host, stderr.trim());
            } else {
                debug!("{} said: {}", host, stderr.trim());
            }
        }

        if !output.status.success() {
            return Err(FetchError::Transfer(format!(
                "scp exited with {}",
                output.status
            )));
        }
        Ok(())
    }

    async fn transfer_with_password(
        &self,
        remote: &Path,
        host: &str,
        local: &Path,
        password: &str,
    ) -> Result<(), FetchError> {
        let mut cmd = CommandBuilder::new("scp");
        for arg in scp_args(&self.user, host, remote, local, false) {
            cmd.arg(arg);
        }

        let password = password.to_string();
        let outcome =
            tokio::task::spawn_blocking(move || expect::run_session(cmd, &password, SESSION_TIMEOUT))
                .await
                .map_err(|e| FetchError::Transfer(e.to_string()))??;

        match outcome {
            Outcome::Success => Ok(()),
            Outcome::BadPassword => Err(FetchError::BadPassword),
            Outcome::PermissionDenied => Err(FetchError::PermissionDenied),
            Outcome::NotFound => Err(FetchError::NotFound),
        }
    }
}

/// Argument vector for one quiet, timestamp-preserving scp download.
/// `batch` forbids interactive prompting, for the key-based path.
fn scp_args(user: &str, host: &str, remote: &Path, local: &Path, batch: bool) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-q".into(),
        "-o".into(),
        format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS),
    ];
    if batch {
        args.push("-o".into());
        args.push("BatchMode=yes".into());
    }
    args.push("-p".into());
    args.push(format!("{}@{}:{}", user, host, remote.display()));
    args.push(local.to_string_lossy().into_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scp_args_key_based() {
        let args = scp_args(
            "admin",
            "web1",
            Path::new("/etc/x.conf"),
            Path::new("/tmp/stage/_etc_x.conf_web1"),
            true,
        );
        assert_eq!(
            args,
            vec![
                "-q",
                "-o",
                "ConnectTimeout=3",
                "-o",
                "BatchMode=yes",
                "-p",
                "admin@web1:/etc/x.conf",
                "/tmp/stage/_etc_x.conf_web1",
            ]
        );
    }

    #[test]
    fn test_scp_args_interactive_omits_batch_mode() {
        let args = scp_args(
            "admin",
            "web1",
            Path::new("/etc/x.conf"),
            Path::new("/tmp/stage/_etc_x.conf_web1"),
            false,
        );
        assert!(!args.iter().any(|a| a == "BatchMode=yes"));
    }

    #[tokio::test]
    async fn test_fetch_all_excludes_failing_hosts() {
        // `.invalid` never resolves, so both transfers fail fast; the
        // result map must simply be empty, with no error surfaced.
        let staging = StagingArea::new().unwrap();
        let fetcher = Fetcher::new("nobody".to_string(), AuthMode::KeyBased, false);
        let hosts = vec!["h1.invalid".to_string(), "h2.invalid".to_string()];

        let staged = fetcher
            .fetch_all(Path::new("/etc/x.conf"), &hosts, &staging)
            .await;
        assert!(staged.is_empty());
        staging.close();
    }

    #[tokio::test]
    async fn test_fetch_all_with_no_hosts() {
        let staging = StagingArea::new().unwrap();
        let fetcher = Fetcher::new("nobody".to_string(), AuthMode::KeyBased, false);

        let staged = fetcher
            .fetch_all(Path::new("/etc/x.conf"), &[], &staging)
            .await;
        assert!(staged.is_empty());
        staging.close();
    }
}
