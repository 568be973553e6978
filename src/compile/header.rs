//! Script header and per-file banners.

use crate::config::{Banner, Header};
use crate::parse::SetOptions;
use crate::parse::tokenize::{parse_set_options, tokenize};

/// Union of the baseline strict mode and every file's declared options.
pub fn reconcile<'a>(baseline: &str, declared: impl IntoIterator<Item = &'a SetOptions>) -> SetOptions {
    let mut options = parse_set_options(&tokenize(baseline));
    for file in declared {
        options.merge(file);
    }
    options
}

/// Render options as one `set` command: letters sorted into a single
/// group, named options next, then a bare `-o`, with `pipefail` last.
/// `None` when there is nothing to set.
pub fn set_line(options: &SetOptions) -> Option<String> {
    if options.is_empty() {
        return None;
    }
    let mut parts = Vec::new();
    if !options.letters.is_empty() {
        parts.push(format!("-{}", options.letters.iter().collect::<String>()));
    }
    let mut pipefail = false;
    for name in &options.long {
        if name == "pipefail" {
            pipefail = true;
        } else {
            parts.push(format!("-o {name}"));
        }
    }
    if options.bare_o {
        parts.push("-o".to_string());
    }
    if pipefail {
        parts.push("-o pipefail".to_string());
    }
    Some(format!("set {}", parts.join(" ")))
}

/// Shebang, blank line, reconciled `set`, blank line.
pub fn header(config: &Header, options: &SetOptions) -> String {
    let mut out = format!("{}\n\n", config.shebang);
    if let Some(line) = set_line(options) {
        out.push_str(&line);
        out.push_str("\n\n");
    }
    out
}

/// Three comment rules with `name` centered in the middle one, then a
/// blank line. An odd fill on an odd-width rule puts the extra delimiter
/// on the left.
pub fn banner(config: &Banner, name: &str) -> String {
    let inner = config.width.saturating_sub(1);
    let rule = format!("#{}\n", config.delimiter.repeat(inner));
    let fill = inner.saturating_sub(name.chars().count());
    let left = fill / 2 + (fill & inner & 1);
    format!(
        "{rule}#{}{name}{}\n{rule}\n",
        config.delimiter.repeat(left),
        config.delimiter.repeat(fill - left)
    )
}
