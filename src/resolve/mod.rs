//! Path and variable resolution against a [`ResolutionContext`].
//!
//! Resolution runs in four steps:
//!
//! 1. `$NAME` / `${NAME...}` references are substituted from the variable
//!    table (plus `BASH_SOURCE` and `PWD`, which track the walk).
//! 2. Remaining references are expanded from the OS environment.
//! 3. `$(dirname ...)`, `$(basename ...)`, `$(realpath ...)`, `$(pwd)` and
//!    `$(cd DIR && pwd)` are evaluated innermost-first until none remain.
//! 4. The unquoted result is anchored on the tracked working directory and
//!    reported as a path when it names an existing filesystem entry.

pub mod context;
pub mod path;

pub use context::{Declaration, DeclarationKind, PathDeclarations, ResolutionContext, VariableTable};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::parse::{self, Command};

/// What to do with a `$NAME` reference nobody defines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Leave the reference verbatim.
    #[default]
    Keep,
    /// Substitute the empty string, as an unset variable would.
    Empty,
}

/// Upper bound on substitution passes; each pass strictly removes calls.
const MAX_PASSES: usize = 32;

/// Result of resolving one raw argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Expanded text, or the absolute normalized path when `path` is set.
    pub text: String,
    /// Set when the text names an existing file or directory.
    pub path: Option<PathBuf>,
    /// The text still holds references or substitutions that could not be
    /// evaluated statically.
    pub dynamic: bool,
}

pub struct Resolver<'a> {
    ctx: &'a ResolutionContext,
    policy: UnresolvedPolicy,
}

impl<'a> Resolver<'a> {
    pub fn new(ctx: &'a ResolutionContext, policy: UnresolvedPolicy) -> Self {
        Self { ctx, policy }
    }

    /// Resolve `raw` (a shell word, quotes included).
    pub fn resolve(&self, raw: &str) -> Resolved {
        let text = raw.trim();
        let expanded = self.substitute(text, &|name| self.lookup(name));
        let expanded = expand_environment(&expanded);
        let mut expanded = self.evaluate_commands(&expanded);
        if self.policy == UnresolvedPolicy::Empty {
            expanded = self.substitute(&expanded, &|_| Some(String::new()));
        }

        let mut unquoted = parse::unquote(&expanded);
        if expanded.starts_with('~') {
            unquoted = shellexpand::tilde(&unquoted).into_owned();
        }
        let dynamic = is_dynamic(&expanded);
        if unquoted.is_empty() || dynamic {
            return Resolved {
                text: if dynamic { expanded } else { unquoted },
                path: None,
                dynamic,
            };
        }

        let candidate = path::absolutize(Path::new(&unquoted), &self.ctx.cwd);
        if candidate.exists() {
            Resolved {
                text: candidate.display().to_string(),
                path: Some(candidate),
                dynamic: false,
            }
        } else {
            Resolved {
                text: unquoted,
                path: None,
                dynamic: false,
            }
        }
    }

    /// True when `raw` names its target relative to where the script runs:
    /// anything not rooted at `/`, `~` or an OS environment variable the
    /// scripts never assign.
    pub fn is_location_dependent(&self, raw: &str) -> bool {
        let text = parse::strip_quotes(raw);
        if text.starts_with(['/', '~']) {
            return false;
        }
        match leading_reference(&text) {
            Some(name) => {
                self.lookup(name).is_some() || std::env::var_os(name).is_none()
            }
            None => true,
        }
    }

    /// Table lookup, with `BASH_SOURCE` and `PWD` following the walk unless
    /// the scripts assign them.
    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(value) = self.ctx.variables.get(name) {
            return Some(value.to_string());
        }
        match name {
            "BASH_SOURCE" => Some(self.ctx.current_file.display().to_string()),
            "PWD" => Some(self.ctx.cwd.display().to_string()),
            "OLDPWD" => Some(self.ctx.oldpwd.display().to_string()),
            _ => None,
        }
    }

    /// Replace `$NAME` and `${NAME...}` references outside single quotes.
    /// References `lookup` cannot answer are kept verbatim.
    fn substitute(&self, text: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let (mut sq, mut dq, mut esc) = (false, false, false);
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if esc {
                out.push(c);
                esc = false;
                i += 1;
                continue;
            }
            if c == '\\' && !sq {
                esc = true;
                out.push(c);
                i += 1;
                continue;
            }
            if c == '\'' && !dq {
                sq = !sq;
            } else if c == '"' && !sq {
                dq = !dq;
            }
            if c != '$' || sq {
                out.push(c);
                i += 1;
                continue;
            }

            match chars.get(i + 1) {
                Some('{') => {
                    let end = brace_end(&chars, i + 2);
                    let close = if chars.get(end - 1) == Some(&'}') { end - 1 } else { end };
                    let raw: String = chars[i..end].iter().collect();
                    let inner: String = chars[i + 2..close.max(i + 2)].iter().collect();
                    match self.parameter(&inner, lookup) {
                        Some(value) => out.push_str(&value),
                        None => out.push_str(&raw),
                    }
                    i = end;
                }
                Some(&d) if d.is_ascii_digit() => {
                    let name = d.to_string();
                    match lookup(&name) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push('$');
                            out.push(d);
                        }
                    }
                    i += 2;
                }
                Some(&n) if n.is_ascii_alphabetic() || n == '_' => {
                    let mut j = i + 1;
                    while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                        j += 1;
                    }
                    let name: String = chars[i + 1..j].iter().collect();
                    match lookup(&name) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push('$');
                            out.push_str(&name);
                        }
                    }
                    i = j;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
        }
        out
    }

    /// Evaluate the inside of `${...}`. `None` leaves the whole reference
    /// untouched.
    fn parameter(&self, inner: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Option<String> {
        if inner.starts_with(['#', '!']) {
            return None;
        }
        let name_len = inner
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(inner.len());
        let (name, rest) = inner.split_at(name_len);
        if name.is_empty() {
            return None;
        }

        if rest.is_empty() {
            return lookup(name);
        }
        if let Some(index) = rest.strip_prefix('[') {
            let (index, tail) = index.split_once(']')?;
            let index = self.substitute(index, lookup);
            return match (index.trim(), tail) {
                ("0" | "@" | "*", "") => lookup(name),
                _ => None,
            };
        }

        let (use_when_empty, default) = if let Some(d) = rest.strip_prefix(":-").or(rest.strip_prefix(":=")) {
            (true, d)
        } else if let Some(d) = rest.strip_prefix('-').or(rest.strip_prefix('=')) {
            (false, d)
        } else {
            return None;
        };
        let value = lookup(name).or_else(|| std::env::var(name).ok());
        match value {
            Some(v) if !(use_when_empty && v.is_empty()) => Some(v),
            _ => Some(parse::unquote(&self.substitute(default, lookup))),
        }
    }

    /// Evaluate path-producing command substitutions until none are left.
    fn evaluate_commands(&self, text: &str) -> String {
        let mut current = text.to_string();
        for _ in 0..MAX_PASSES {
            let next = self.evaluate_pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// One innermost-first pass over the top-level substitutions of `text`.
    fn evaluate_pass(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for span in parse::find_substitutions(text) {
            out.push_str(&text[last..span.start]);
            let body = span.slice(text);
            let inner = body
                .strip_prefix("$(")
                .and_then(|b| b.strip_suffix(')'))
                .unwrap_or(&body[2..]);
            let inner = self.evaluate_pass(inner);
            match self.evaluate_command(&inner) {
                Some(result) => out.push_str(&result),
                None => {
                    out.push_str("$(");
                    out.push_str(&inner);
                    out.push(')');
                }
            }
            last = span.end;
        }
        out.push_str(&text[last..]);
        out
    }

    /// Evaluate one command substitution body, if it is a path command with
    /// a static argument.
    fn evaluate_command(&self, inner: &str) -> Option<String> {
        let statements = parse::split_statements(inner);
        if let [cd, pwd] = statements.as_slice()
            && is_pwd(&pwd.text)
            && let Command::Cd {
                argument: Some(argument),
                ..
            } = parse::classify(&cd.text)
        {
            let dir = static_argument(&[argument])?;
            return Some(path::realpath(&dir, &self.ctx.cwd));
        }

        let words = parse::tokenize(inner);
        let (command, args) = words.split_first()?;
        match command.as_str() {
            "pwd" if is_pwd(inner) => Some(self.ctx.cwd.display().to_string()),
            "dirname" => Some(path::dirname(&static_argument(args)?)),
            "basename" => {
                let operands = operands(args);
                let name = path::basename(&static_argument(&operands)?);
                match operands.get(1) {
                    Some(suffix) if name != *suffix => {
                        Some(name.strip_suffix(suffix.as_str()).unwrap_or(&name).to_string())
                    }
                    _ => Some(name),
                }
            }
            "realpath" => Some(path::realpath(&static_argument(args)?, &self.ctx.cwd)),
            "readlink" if args.iter().any(|a| a == "-f" || a == "-e" || a == "-m") => {
                Some(path::realpath(&static_argument(args)?, &self.ctx.cwd))
            }
            _ => None,
        }
    }
}

/// Words after the options (`-x`, `--`) of a command.
fn operands(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut options_done = false;
    for arg in args {
        if !options_done && arg == "--" {
            options_done = true;
        } else if !options_done && arg.starts_with('-') && arg.len() > 1 {
            continue;
        } else {
            out.push(arg.clone());
        }
    }
    out
}

/// The first operand, provided it has nothing left to expand.
fn static_argument(args: &[String]) -> Option<String> {
    let arg = operands(args).into_iter().next()?;
    let arg = parse::unquote(&arg);
    (!is_dynamic(&arg)).then_some(arg)
}

fn is_pwd(text: &str) -> bool {
    matches!(text.trim(), "pwd" | "pwd -P" | "pwd -L")
}

/// Index just past the `}` matching an already consumed `${`.
fn brace_end(chars: &[char], start: usize) -> usize {
    let mut depth = 1;
    let mut j = start;
    while j < chars.len() {
        match chars[j] {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return j + 1;
                }
            }
            _ => {}
        }
        j += 1;
    }
    chars.len()
}

/// Expand OS environment variables outside single quotes.
fn expand_environment(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut segment = String::new();
    let (mut sq, mut dq) = (false, false);
    let flush = |segment: &mut String, out: &mut String| {
        let expanded = shellexpand::env_with_context_no_errors(segment.as_str(), |name: &str| {
            std::env::var(name).ok()
        });
        out.push_str(&expanded);
        segment.clear();
    };

    for c in text.chars() {
        if c == '\'' && !dq {
            if sq {
                out.push(c);
            } else {
                flush(&mut segment, &mut out);
                out.push(c);
            }
            sq = !sq;
            continue;
        }
        if c == '"' && !sq {
            dq = !dq;
        }
        if sq {
            out.push(c);
        } else {
            segment.push(c);
        }
    }
    flush(&mut segment, &mut out);
    out
}

/// Name of the variable `text` starts with, if it starts with a reference.
fn leading_reference(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('$')?;
    let rest = rest.strip_prefix('{').unwrap_or(rest);
    let len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    (len > 0).then(|| &rest[..len])
}

/// True when `text` still contains a variable reference, a command
/// substitution or a backtick outside single quotes.
pub fn is_dynamic(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let (mut sq, mut dq) = (false, false);
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '\'' if !dq => sq = !sq,
            '"' if !sq => dq = !dq,
            '`' if !sq => return true,
            '$' if !sq => {
                let opens = chars
                    .get(i + 1)
                    .is_some_and(|&n| n.is_ascii_alphanumeric() || "_{(@*#?!$".contains(n));
                if opens {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}
