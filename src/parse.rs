//! # Configuration Parsing
//!
//! Turns one staged configuration file into an ordered list of
//! (directive, value) pairs. The parser is delimiter-tolerant: a delimiter
//! that never splits a line does not abort the run, it flags the whole file
//! so the renderer can hold its output back instead of printing something
//! misleading.
//!
//! Parsing is a pure function of the text and the delimiter; every worker
//! produces an immutable [`ParsedConfig`] and shares nothing.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::error;

/// Parse result for one (file, machine) pair.
///
/// `entries` preserves file order and keeps repeated directives, one entry
/// per occurrence. `directives` is the same order without the values, also
/// not deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfig {
    pub host: String,
    pub entries: Vec<(String, String)>,
    pub directives: Vec<String>,
    pub delimiter_error: bool,
}

impl ParsedConfig {
    pub fn contains_directive(&self, directive: &str) -> bool {
        self.directives.iter().any(|d| d == directive)
    }
}

/// Read and parse a staged file. IO failures propagate; the caller logs them
/// and drops the machine from the comparison.
pub fn parse_file(path: &Path, host: &str, delimiter: &str) -> Result<ParsedConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read staged copy {}", path.display()))?;
    Ok(parse_text(host, &text, delimiter))
}

/// Parse raw configuration text into ordered (directive, value) pairs.
pub fn parse_text(host: &str, text: &str, delimiter: &str) -> ParsedConfig {
    let mut config = ParsedConfig {
        host: host.to_string(),
        entries: Vec::new(),
        directives: Vec::new(),
        delimiter_error: false,
    };

    for raw_line in text.lines() {
        let line = raw_line.trim().replace('\t', " ");
        if !is_config_line(&line) {
            continue;
        }

        let pieces: Vec<&str> = line.split(delimiter).collect();
        let (directive, raw_value) = match pieces.len() {
            0 => {
                // str::split always yields at least one piece.
                error!("line produced no pieces, skipping: {}", line);
                continue;
            }
            1 => {
                // Likely a delimiter mismatch; keep the line as a bare
                // directive and flag the whole file.
                config.delimiter_error = true;
                (pieces[0].to_string(), String::new())
            }
            2 => (pieces[0].to_string(), pieces[1].to_string()),
            // The delimiter appeared inside the value; stitch it back.
            _ => (pieces[0].to_string(), pieces[1..].join(delimiter)),
        };

        let value = strip_inline_comment(&raw_value).trim().to_string();
        config.directives.push(directive.clone());
        config.entries.push((directive, value));
    }

    config
}

/// A configuration line starts with an ASCII alphanumeric or `$`. Everything
/// else (blanks, comments, section brackets) is skipped.
fn is_config_line(line: &str) -> bool {
    line.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '$')
}

/// Strip a trailing inline comment from a value.
///
/// Keeps the longest leading run of characters excluding `#`, `;`, `/`, `!`
/// when that run is immediately followed by one of those markers (`//` must
/// be exactly two slashes). A lone `/` disqualifies every later marker, so
/// the value is kept verbatim in that case.
pub fn strip_inline_comment(value: &str) -> &str {
    for (i, ch) in value.char_indices() {
        match ch {
            '#' | ';' | '!' => return &value[..i],
            '/' => {
                if value[i..].starts_with("//") {
                    return &value[..i];
                }
                return value;
            }
            _ => {}
        }
    }
    value
}
