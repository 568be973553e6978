//! Line rewriting: recorded `cd`/path declarations, and the final pass
//! that neutralizes any `source` left in the merged text.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::Rewrite;
use crate::parse::{self, AssignOp, Command, MultilineQuotes, Span};
use crate::resolve::{Declaration, DeclarationKind, path};

/// What a declaration is rewritten against.
pub struct Rules<'a> {
    pub entry_dir: &'a Path,
    /// Every file being merged.
    pub merged: HashSet<&'a Path>,
    pub config: &'a Rewrite,
}

impl<'a> Rules<'a> {
    pub fn new(entry_dir: &'a Path, merged: &'a [PathBuf], config: &'a Rewrite) -> Self {
        Self {
            entry_dir,
            merged: merged.iter().map(PathBuf::as_path).collect(),
            config,
        }
    }

    /// Replacement text for the declaration's span, or `None` to keep it.
    pub fn replacement(&self, declaration: &Declaration) -> Option<String> {
        match &declaration.kind {
            DeclarationKind::Cd { resolved, .. } => {
                if path::is_within(resolved, self.entry_dir) {
                    Some(self.config.noop.clone())
                } else if declaration.relative {
                    Some(format!("cd \"{}\"", resolved.display()))
                } else {
                    None
                }
            }
            DeclarationKind::Var {
                name,
                operator,
                resolved,
                ..
            } => {
                let value = if self.merged.contains(resolved.as_path()) {
                    self.config.self_reference.clone()
                } else if declaration.relative {
                    format!("\"{}\"", resolved.display())
                } else {
                    return None;
                };
                match operator {
                    AssignOp::Assign => Some(value),
                    AssignOp::Append => Some(format!("{name}={value}")),
                }
            }
        }
    }

    /// Apply every declaration recorded for `line`.
    pub fn apply(&self, line: &str, declarations: &[Declaration]) -> String {
        let edits = declarations
            .iter()
            .filter_map(|d| Some((d.span, self.replacement(d)?)))
            .collect();
        apply_edits(line, edits)
    }
}

/// Replace spans of `text`, right to left. Spans that overlap an edit
/// already applied are dropped.
pub(crate) fn apply_edits(text: &str, mut edits: Vec<(Span, String)>) -> String {
    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    let mut out = text.to_string();
    let mut limit = text.len();
    for (span, replacement) in edits {
        if span.end > limit || span.start > span.end {
            continue;
        }
        out.replace_range(span.start..span.end, &replacement);
        limit = span.start;
    }
    out
}

/// Replace the keyword of every `source`/`.` command in `text` with
/// `noop`, including inside `$(...)`. Arguments are left in place.
pub fn sanitize(text: &str, noop: &str) -> String {
    let mut quotes = MultilineQuotes::default();
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let (body, newline) = match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        };
        if quotes.absorb(body) {
            out.push_str(line);
            continue;
        }
        out.push_str(&sanitize_line(body, noop));
        out.push_str(newline);
    }
    out
}

fn sanitize_line(line: &str, noop: &str) -> String {
    let mut edits = Vec::new();
    for statement in parse::split_statements(line) {
        if let Command::Source { keyword, .. } = parse::classify(&statement.text) {
            edits.push((keyword.shifted(statement.offset), noop.to_string()));
        }
    }
    for span in parse::find_substitutions(line) {
        let Some(inner) = span
            .slice(line)
            .strip_prefix("$(")
            .and_then(|s| s.strip_suffix(')'))
        else {
            continue;
        };
        let cleaned = sanitize_line(inner, noop);
        if cleaned != inner {
            edits.push((span, format!("$({cleaned})")));
        }
    }
    apply_edits(line, edits)
}
