//! # Staging Area
//!
//! Temporary local storage for fetched remote copies, scoped to one
//! configuration file's comparison run. Staged names are derived from the
//! remote path and the machine name, so concurrent fetch workers never write
//! the same file and every copy can be traced back to its origin.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;
use tracing::warn;

/// Separator between the flattened file path and the machine name in a
/// staged file name. Machine names containing it are rejected up front.
pub const HOST_SEPARATOR: char = '_';

/// A per-file staging directory.
///
/// Backed by a [`TempDir`], so the directory is removed on drop even when a
/// run is torn down early; [`StagingArea::close`] removes it eagerly and
/// logs a failure instead of surfacing it.
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Local path where the copy of `config_file` fetched from `host` lands.
    pub fn staged_path(&self, config_file: &Path, host: &str) -> PathBuf {
        self.dir.path().join(staged_file_name(config_file, host))
    }

    /// Remove the staging directory now. Cleanup failures never alter the
    /// run's outcome.
    pub fn close(self) {
        if let Err(e) = self.dir.close() {
            warn!("staging cleanup failed: {}", e);
        }
    }
}

/// Flatten a config file path and machine name into a staged file name,
/// e.g. `/etc/x.conf` on `web1` becomes `_etc_x.conf_web1`.
pub fn staged_file_name(config_file: &Path, host: &str) -> String {
    let flattened = config_file.to_string_lossy().replace('/', "_");
    format!("{}{}{}", flattened, HOST_SEPARATOR, host)
}

/// Recover the machine name from a staged file name (the last `_` segment).
pub fn host_from_staged_name(name: &str) -> &str {
    name.rsplit(HOST_SEPARATOR).next().unwrap_or(name)
}
