//! # Diff/Render Engine
//!
//! Aggregates every machine's parse result for one configuration file into a
//! directive-indexed view and renders the comparison: directives sorted
//! lexicographically, annotated with how many machines lack them, followed by
//! one aligned line per machine that carries the directive. Values observed
//! on exactly one machine are highlighted when color is enabled.
//!
//! Rendering produces a `String` so the engine stays testable; the CLI prints
//! the returned block.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use colored::*;

use crate::parse::ParsedConfig;

/// Emitted instead of any detail when a delimiter failed to split a line
/// anywhere in the file.
pub const HELD_BACK_WARNING: &str =
    "Output was held back. Try using or removing the delimiter flag.";

/// Directive-indexed aggregation of all parse results for one file.
///
/// Everything here is file-scoped: the column width and the uniqueness tags
/// are recomputed for every configuration file being compared.
pub struct DirectiveView {
    /// Distinct directive names across all machines, sorted.
    pub directives: Vec<String>,
    /// Per directive, the number of machines whose file lacks it.
    pub absence: HashMap<String, usize>,
    /// Value strings observed exactly once across all occurrences on all
    /// machines. Empty unless more than one machine participates.
    pub tagged: HashSet<String>,
    /// Right-alignment width for machine names (longest name + 2).
    pub host_column: usize,
}

/// Build the cross-machine view for one file.
///
/// Tagging is computed once over the full occurrence multiset; single-host
/// comparisons never tag.
pub fn build_view(configs: &[ParsedConfig], comparison_hosts: usize) -> DirectiveView {
    let directives: Vec<String> = configs
        .iter()
        .flat_map(|c| c.directives.iter().map(String::as_str))
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut absence = HashMap::with_capacity(directives.len());
    for directive in &directives {
        let missing = configs
            .iter()
            .filter(|c| !c.contains_directive(directive))
            .count();
        absence.insert(directive.clone(), missing);
    }

    let mut occurrences: HashMap<&str, usize> = HashMap::new();
    for config in configs {
        for (_, value) in &config.entries {
            *occurrences.entry(value.as_str()).or_insert(0) += 1;
        }
    }
    let tagged = if comparison_hosts > 1 {
        occurrences
            .into_iter()
            .filter(|(_, count)| *count == 1)
            .map(|(value, _)| value.to_string())
            .collect()
    } else {
        HashSet::new()
    };

    let host_column = configs.iter().map(|c| c.host.len()).max().unwrap_or(0) + 2;

    DirectiveView {
        directives,
        absence,
        tagged,
        host_column,
    }
}

/// Render the comparison block for one configuration file.
///
/// When any machine's parse flagged a delimiter error, the whole file's
/// detail is withheld and only [`HELD_BACK_WARNING`] is emitted.
pub fn render(
    file: &Path,
    configs: &[ParsedConfig],
    color: bool,
    comparison_hosts: usize,
) -> String {
    let mut out = String::new();

    let header = format!("=== {}", file.display());
    let header = if color {
        header.bold().to_string()
    } else {
        header
    };
    out.push('\n');
    out.push_str(&header);
    out.push_str("\n\n");

    if configs.iter().any(|c| c.delimiter_error) {
        out.push_str(HELD_BACK_WARNING);
        out.push_str("\n\n");
        return out;
    }

    let view = build_view(configs, comparison_hosts);

    for directive in &view.directives {
        let absent = view.absence.get(directive).copied().unwrap_or(0);
        if absent > 0 {
            let count = if color {
                absent.to_string().bright_yellow().to_string()
            } else {
                absent.to_string()
            };
            out.push_str(&format!("{} ({})\n", directive, count));
        } else {
            out.push_str(directive);
            out.push('\n');
        }

        for config in configs {
            for (name, value) in &config.entries {
                if name != directive {
                    continue;
                }
                let shown = if color && view.tagged.contains(value) {
                    value.bright_red().to_string()
                } else {
                    value.clone()
                };
                out.push_str(&format!(
                    "{:>width$}  {}\n",
                    config.host,
                    shown,
                    width = view.host_column
                ));
            }
        }
    }

    out.push('\n');
    out
}
