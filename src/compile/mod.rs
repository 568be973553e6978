//! Merge Compiler: turns a [`Resolution`] into one self-contained script.

pub mod header;
pub mod rewrite;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::config::Config;
use crate::deps::{self, Resolution};
use crate::error::{Error, Result};
use crate::parse::{self, Command, MultilineQuotes};
use crate::resolve::{Declaration, path};
use rewrite::Rules;

/// Compile `entry` and write the merged script to `output`.
pub fn compile(entry: &Path, output: &Path, config: &Config) -> Result<()> {
    let merged = compile_to_string(entry, config)?;
    fs::write(output, merged).map_err(|e| Error::io(output, e))?;
    make_executable(output)?;
    info!("wrote {}", output.display());
    Ok(())
}

/// Resolve and merge `entry`, returning the merged script.
pub fn compile_to_string(entry: &Path, config: &Config) -> Result<String> {
    let resolution = deps::resolve_dependencies(entry, &config.settings)?;
    merge(&resolution, config)
}

/// Merge the files of a finished walk, in order.
pub fn merge(resolution: &Resolution, config: &Config) -> Result<String> {
    let options = header::reconcile(
        &config.header.strict_mode,
        resolution
            .order
            .iter()
            .filter_map(|file| resolution.context.set_options.get(file)),
    );
    let mut out = header::header(&config.header, &options);

    let entry_dir = resolution.entry_dir();
    let rules = Rules::new(entry_dir, &resolution.order, &config.rewrite);
    for file in &resolution.order {
        let content = fs::read_to_string(file).map_err(|e| Error::io(file, e))?;
        let name = path::relative_to(file, entry_dir);
        debug!("merging {}", name.display());

        out.push_str(&header::banner(&config.banner, &name.display().to_string()));
        out.push_str(&extract(&content, resolution.declarations_for(file), &rules));
        out.push('\n');
    }
    Ok(rewrite::sanitize(&out, &config.rewrite.noop))
}

/// The lines of one file that belong in the merged output, rewritten.
///
/// Function bodies are kept whole. At top level, blank lines, comments and
/// lines made only of `set`/`source` commands are dropped.
pub fn extract(
    content: &str,
    declarations: Option<&BTreeMap<usize, Vec<Declaration>>>,
    rules: &Rules<'_>,
) -> String {
    let mut out = String::new();
    let mut quotes = MultilineQuotes::default();
    let mut depth: i32 = 0;

    for (index, line) in content.lines().enumerate() {
        if quotes.absorb(line) {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        let in_function = depth > 0;
        depth = (depth + parse::brace_delta(line)).max(0);

        let line = match declarations.and_then(|d| d.get(&index)) {
            Some(recorded) => rules.apply(line, recorded),
            None => line.to_string(),
        };
        if in_function || keep_top_level(&line) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

fn keep_top_level(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return false;
    }
    let statements = parse::split_statements(line);
    !statements.iter().all(|s| match parse::classify(&s.text) {
        Command::Set(options) => !options.is_empty(),
        Command::Source { .. } => true,
        _ => false,
    })
}

#[cfg(unix)]
fn make_executable(output: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(output)
        .map_err(|e| Error::io(output, e))?
        .permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(output, permissions).map_err(|e| Error::io(output, e))
}

#[cfg(not(unix))]
fn make_executable(_output: &Path) -> Result<()> {
    Ok(())
}
