//! # ConfDiff
//!
//! Compare Unix configuration files across remote machines.
//!
//! ConfDiff probes a set of machines for reachability, fetches the named
//! configuration files from every machine that answers, parses each copy into
//! an ordered list of directive/value pairs, and renders a per-directive diff
//! that highlights directives missing on some machines and values that only a
//! single machine carries.
//!
//! ## Core Modules
//!
//! - [`cli`] - Command-line interface and run orchestration
//! - [`probe`] - Host reachability probing (ping sweep + SSH banner check)
//! - [`fetch`] - Bounded pool of remote file transfers
//! - [`expect`] - Prompt/response protocol for password-driven transfers
//! - [`staging`] - Temporary staging of fetched copies
//! - [`parse`] - Delimiter-tolerant configuration parsing
//! - [`diff`] - Cross-machine aggregation and report rendering
//! - [`pool`] - Fixed-size worker pool over a shared job queue
//!
//! ## Quick Start
//!
//! ```bash
//! # Compare sshd configuration across three machines
//! confdiff /etc/ssh/sshd_config -m web1,web2,web3
//!
//! # Force an '=' delimiter and a shared password
//! confdiff /etc/sysctl.conf -m db1,db2 -d = -p
//! ```

pub mod cli;
pub mod diff;
pub mod expect;
pub mod fetch;
pub mod parse;
pub mod pool;
pub mod probe;
pub mod staging;

pub use fetch::AuthMode;
pub use parse::ParsedConfig;
