//! # Reachability Prober
//!
//! Two-stage liveness filter for the candidate machines. A single bulk ping
//! sweep (system `fping`, short timeout, one retry) partitions the set into
//! alive and dead; the alive subset then gets a bounded pool of TCP probes
//! that only accept machines answering with a recognizable SSH banner on
//! port 22. Machines failing either stage are excluded quietly; probing
//! never fails the run.

use std::collections::HashSet;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::pool;

pub const SERVICE_PORT: u16 = 22;
const BANNER_PREFIX: &str = "SSH-2.0-OpenSSH_";
const BANNER_WORKERS: usize = 10;
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Disjoint partition of the probed machines; `available` and `unreachable`
/// together cover exactly the input set.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub available: Vec<String>,
    pub unreachable: Vec<String>,
}

/// Classify every machine as available (answers ping and serves an SSH
/// banner) or unreachable. The available list preserves input order.
pub async fn probe(hosts: &[String]) -> ProbeReport {
    let (alive, mut unreachable) = ping_sweep(hosts).await;
    debug!(
        "{} of {} machines answered the ping sweep",
        alive.len(),
        hosts.len()
    );

    let available = banner_sweep(&alive).await;
    let available_set: HashSet<&str> = available.iter().map(String::as_str).collect();
    for host in &alive {
        if !available_set.contains(host.as_str()) {
            debug!("{} answered ping but offered no service banner", host);
            unreachable.push(host.clone());
        }
    }

    ProbeReport {
        available,
        unreachable,
    }
}

/// One bulk `fping -r 1 -t 1000` across all candidates. A sweep that cannot
/// run at all degrades to "everything unreachable" with a warning.
async fn ping_sweep(hosts: &[String]) -> (Vec<String>, Vec<String>) {
    if hosts.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let output = Command::new("fping")
        .args(["-r", "1", "-t", "1000"])
        .args(hosts)
        .stderr(std::process::Stdio::null())
        .output()
        .await;

    let stdout = match output {
        // fping exits nonzero whenever any host is down; only the per-host
        // stdout lines matter.
        Ok(out) => String::from_utf8_lossy(&out.stdout).into_owned(),
        Err(e) => {
            warn!("ping sweep failed to run: {}", e);
            String::new()
        }
    };

    partition_alive(&stdout, hosts)
}

/// Split `hosts` by membership in the sweep's `<host> is alive` lines.
fn partition_alive(output: &str, hosts: &[String]) -> (Vec<String>, Vec<String>) {
    let alive: HashSet<&str> = output
        .lines()
        .filter_map(|line| line.strip_suffix(" is alive"))
        .map(str::trim)
        .collect();

    let mut reachable = Vec::new();
    let mut unreachable = Vec::new();
    for host in hosts {
        if alive.contains(host.as_str()) {
            reachable.push(host.clone());
        } else {
            unreachable.push(host.clone());
        }
    }
    (reachable, unreachable)
}

/// Banner-check the alive machines over a pool of at most
/// [`BANNER_WORKERS`] concurrent probes.
async fn banner_sweep(alive: &[String]) -> Vec<String> {
    let results = pool::run_bounded(BANNER_WORKERS, alive.to_vec(), |host| async move {
        let ok = banner_probe(&host, SERVICE_PORT).await;
        (host, ok)
    })
    .await;

    let confirmed: HashSet<String> = results
        .into_iter()
        .filter(|(_, ok)| *ok)
        .map(|(host, _)| host)
        .collect();

    alive
        .iter()
        .filter(|host| confirmed.contains(*host))
        .cloned()
        .collect()
}

/// Connect and read the service banner, both within [`PROBE_TIMEOUT`].
async fn banner_probe(host: &str, port: u16) -> bool {
    let mut stream = match timeout(PROBE_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => stream,
        _ => return false,
    };

    let mut banner = [0u8; 64];
    match timeout(PROBE_TIMEOUT, stream.read(&mut banner)).await {
        Ok(Ok(n)) if n > 0 => banner_is_recognized(&banner[..n]),
        _ => false,
    }
}

fn banner_is_recognized(banner: &[u8]) -> bool {
    banner.starts_with(BANNER_PREFIX.as_bytes())
}
