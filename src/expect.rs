//! # Interactive Transfer Protocol
//!
//! Password-driven transfers cannot run in batch mode: scp prompts on its
//! controlling terminal. This module drives such a session through a pty,
//! classifying the exchange with an explicit state machine instead of ad-hoc
//! scraping: wait for the password prompt, send the password once, then
//! decide among re-prompt (bad password), permission denied, missing remote
//! file, or success.
//!
//! The state machine ([`PromptMachine`]) is pure and fed incrementally, so
//! marker text split across reads still matches. The driver
//! ([`run_session`]) owns the pty and bounds every await with a timeout.

use std::io::{Read, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tracing::debug;

/// Marker substrings mirrored from OpenSSH output. Matching on suffixes
/// keeps them case-tolerant ("Password:" vs "password:").
const PROMPT_MARKER: &str = "assword:";
const DENIED_MARKER: &str = "ermission denied";
const MISSING_MARKER: &str = "o such file or directory";

/// Where the session currently is in the prompt/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingPrompt,
    PasswordSent,
}

/// Final classification of one interactive transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    BadPassword,
    PermissionDenied,
    NotFound,
}

/// What the driver should do after feeding the machine a chunk of output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Pending,
    SendPassword,
    Finished(Outcome),
}

/// Incremental matcher over the session's output stream.
#[derive(Debug)]
pub struct PromptMachine {
    state: SessionState,
    buffer: String,
}

impl PromptMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::AwaitingPrompt,
            buffer: String::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Feed one chunk of session output and advance the exchange.
    pub fn feed(&mut self, chunk: &str) -> Step {
        self.buffer.push_str(chunk);

        match self.state {
            SessionState::AwaitingPrompt => {
                if self.buffer.contains(PROMPT_MARKER) {
                    self.state = SessionState::PasswordSent;
                    // Start fresh so the first prompt cannot satisfy the
                    // re-prompt check below.
                    self.buffer.clear();
                    Step::SendPassword
                } else {
                    Step::Pending
                }
            }
            SessionState::PasswordSent => {
                if self.buffer.contains(PROMPT_MARKER) {
                    Step::Finished(Outcome::BadPassword)
                } else if self.buffer.contains(DENIED_MARKER) {
                    Step::Finished(Outcome::PermissionDenied)
                } else if self.buffer.contains(MISSING_MARKER) {
                    Step::Finished(Outcome::NotFound)
                } else {
                    Step::Pending
                }
            }
        }
    }

    /// Classify end-of-stream. A silent close after the password went out is
    /// a completed transfer; a close before any prompt means authentication
    /// was never needed (the caller verifies the staged copy either way).
    pub fn finish(&self) -> Outcome {
        Outcome::Success
    }
}

impl Default for PromptMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `cmd` under a pty, answering its password prompt, and classify the
/// outcome. Every wait on session output is bounded by `timeout`; the child
/// is force-killed on the bad-password path (scp would re-prompt forever)
/// and on timeout, and reaped on every path.
pub fn run_session(cmd: CommandBuilder, password: &str, timeout: Duration) -> Result<Outcome> {
    let pty = native_pty_system();
    let pair = pty
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| anyhow!("failed to open pty: {}", e))?;

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| anyhow!("failed to spawn transfer: {}", e))?;
    drop(pair.slave);

    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| anyhow!("failed to attach to session output: {}", e))?;
    let mut writer = pair
        .master
        .take_writer()
        .map_err(|e| anyhow!("failed to attach to session input: {}", e))?;

    // The pty reader is blocking; a side thread forwards chunks so the
    // driver can wait with a deadline.
    let (chunk_tx, chunk_rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        let mut buf = [0u8; 1024];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if chunk_tx.send(chunk).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut machine = PromptMachine::new();
    loop {
        match chunk_rx.recv_timeout(timeout) {
            Ok(chunk) => {
                debug!("session output: {}", chunk.trim_end());
                match machine.feed(&chunk) {
                    Step::Pending => {}
                    Step::SendPassword => {
                        writer.write_all(password.as_bytes())?;
                        writer.write_all(b"\n")?;
                        writer.flush()?;
                    }
                    Step::Finished(outcome) => {
                        if outcome == Outcome::BadPassword {
                            let _ = child.kill();
                        }
                        let _ = child.wait();
                        return Ok(outcome);
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                // Session closed its end of the pty.
                let _ = child.wait();
                return Ok(machine.finish());
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!("timed out waiting for remote response"));
            }
        }
    }
}
