//! Dependency Walker.
//!
//! Visits the entry point and, recursively, every file it sources, in the
//! order a shell would execute them. Variable bindings and the working
//! directory live in one [`ResolutionContext`] shared by the whole walk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::parse::{self, AssignOp, Assignment, Command, MultilineQuotes, Span, Statement};
use crate::resolve::{Declaration, DeclarationKind, ResolutionContext, Resolver, UnresolvedPolicy, VariableTable, path};

/// Outcome of a walk: the merge order and everything learned on the way.
#[derive(Debug)]
pub struct Resolution {
    /// Absolute, normalized entry point.
    pub entry: PathBuf,
    /// Dependency-first file order. Each file appears once; the entry
    /// point is last.
    pub order: Vec<PathBuf>,
    pub context: ResolutionContext,
}

impl Resolution {
    /// Directory the entry point lives in.
    pub fn entry_dir(&self) -> &Path {
        self.entry.parent().unwrap_or(Path::new("/"))
    }

    pub fn declarations_for(&self, file: &Path) -> Option<&BTreeMap<usize, Vec<Declaration>>> {
        self.context.declarations_for(file)
    }

    /// Serializable summary for `--deps --json`.
    pub fn report(&self) -> Report<'_> {
        let mut files: Vec<FileReport<'_>> = self
            .order
            .iter()
            .filter_map(|file| {
                let lines = self.context.declarations_for(file)?;
                Some(FileReport {
                    file,
                    lines: lines
                        .iter()
                        .map(|(line, declarations)| LineReport {
                            line: line + 1,
                            declarations,
                        })
                        .collect(),
                })
            })
            .collect();
        files.sort_by(|a, b| a.file.cmp(b.file));
        Report {
            entry: &self.entry,
            order: &self.order,
            variables: &self.context.variables,
            declarations: files,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub entry: &'a Path,
    pub order: &'a [PathBuf],
    pub variables: &'a VariableTable,
    pub declarations: Vec<FileReport<'a>>,
}

#[derive(Debug, Serialize)]
pub struct FileReport<'a> {
    pub file: &'a Path,
    pub lines: Vec<LineReport<'a>>,
}

#[derive(Debug, Serialize)]
pub struct LineReport<'a> {
    /// One-based line number.
    pub line: usize,
    pub declarations: &'a [Declaration],
}

/// Walk `entry` and everything it sources.
///
/// Fails when the entry point is not a regular file, a sourced file or a
/// `cd` target does not exist, or the `source` graph is cyclic.
pub fn resolve_dependencies(entry: &Path, settings: &Settings) -> Result<Resolution> {
    if !entry.is_file() {
        return Err(Error::EntryPointInvalid(entry.to_path_buf()));
    }
    let cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;
    let entry = path::absolutize(entry, &cwd);
    info!("resolving dependencies of {}", entry.display());

    let mut walker = Walker::new(&entry, settings);
    walker.walk(&entry)?;

    let Walker {
        mut order, ctx, ..
    } = walker;
    let mut seen = HashSet::new();
    order.retain(|file| *file != entry && seen.insert(file.clone()));
    order.push(entry.clone());
    debug!("merge order: {order:?}");
    for (name, value) in ctx.variables.iter() {
        trace!("final binding {name}={value}");
    }

    Ok(Resolution {
        entry,
        order,
        context: ctx,
    })
}

struct Walker {
    ctx: ResolutionContext,
    policy: UnresolvedPolicy,
    recursion_limit: u32,
    /// Files currently being walked, outermost first.
    chain: Vec<PathBuf>,
    /// Times each (target, referrer) edge has been followed.
    visits: HashMap<(PathBuf, PathBuf), u32>,
    /// Edges whose target has already been appended to `order`.
    appended: HashSet<(PathBuf, PathBuf)>,
    /// Files whose declarations have been recorded.
    walked: HashSet<PathBuf>,
    order: Vec<PathBuf>,
}

impl Walker {
    fn new(entry: &Path, settings: &Settings) -> Self {
        Self {
            ctx: ResolutionContext::new(entry),
            policy: settings.unresolved_variables,
            recursion_limit: settings.recursion_limit,
            chain: vec![entry.to_path_buf()],
            visits: HashMap::new(),
            appended: HashSet::new(),
            walked: HashSet::new(),
            order: Vec::new(),
        }
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.ctx, self.policy)
    }

    fn walk(&mut self, file: &Path) -> Result<()> {
        let content = fs::read_to_string(file).map_err(|e| Error::io(file, e))?;
        let record = self.walked.insert(file.to_path_buf());
        info!("walking {}", file.display());

        let previous = std::mem::replace(&mut self.ctx.current_file, file.to_path_buf());
        let walked = self.walk_lines(file, &content, record);
        self.ctx.current_file = previous;
        walked
    }

    fn walk_lines(&mut self, file: &Path, content: &str, record: bool) -> Result<()> {
        let mut quotes = MultilineQuotes::default();
        let mut depth: i32 = 0;
        for (index, line) in content.lines().enumerate() {
            if quotes.absorb(line) {
                continue;
            }
            let top_level = depth == 0;
            depth = (depth + parse::brace_delta(line)).max(0);

            for statement in parse::split_statements(line) {
                let site = Site {
                    file,
                    line: index,
                    statement: &statement,
                    record,
                };
                match parse::classify(&statement.text) {
                    Command::Cd { argument, span } => {
                        self.change_dir(&site, argument.as_deref(), span)?
                    }
                    Command::Assign(bindings) => {
                        for binding in bindings {
                            self.assign(&site, binding);
                        }
                    }
                    Command::Source { argument, .. } => self.source(&site, &argument)?,
                    Command::Set(options) if top_level && !options.is_empty() => {
                        debug!("{}: set {options:?}", site);
                        self.ctx.add_set_options(file, &options);
                    }
                    Command::FunctionDef { name } => debug!("{}: function {name}", site),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn change_dir(&mut self, site: &Site<'_>, argument: Option<&str>, span: Span) -> Result<()> {
        let (raw, target) = match argument {
            None => {
                let Some(home) = std::env::var_os("HOME") else {
                    warn!("{}: cd without argument and HOME unset, skipping", site);
                    return Ok(());
                };
                ("~".to_string(), PathBuf::from(home))
            }
            Some("-") => ("-".to_string(), self.ctx.oldpwd.clone()),
            Some(raw) => {
                let resolved = self.resolver().resolve(raw);
                if resolved.dynamic {
                    warn!("{}: cannot resolve cd target {raw}, skipping", site);
                    return Ok(());
                }
                let target = match resolved.path {
                    Some(path) if path.is_file() => path.parent().map_or(path.clone(), Path::to_path_buf),
                    Some(path) => path,
                    None => return Err(site.directory_not_found(resolved.text)),
                };
                (raw.to_string(), target)
            }
        };
        if !target.is_dir() {
            return Err(site.directory_not_found(target.display().to_string()));
        }

        if site.record {
            let relative = argument.is_some_and(|a| a != "-" && self.resolver().is_location_dependent(a));
            self.ctx.record(
                site.file,
                site.line,
                Declaration {
                    kind: DeclarationKind::Cd {
                        argument: raw,
                        resolved: target.clone(),
                    },
                    span: span.shifted(site.statement.offset),
                    relative,
                },
            );
        }
        debug!("{}: cd {}", site, target.display());
        self.ctx.change_dir(target);
        Ok(())
    }

    fn assign(&mut self, site: &Site<'_>, binding: Assignment) {
        let resolved = self.resolver().resolve(&binding.value);
        if resolved.dynamic {
            debug!("{}: {} keeps unresolved references: {}", site, binding.name, resolved.text);
        }
        let (value, target) = match binding.operator {
            AssignOp::Assign => (resolved.text, resolved.path),
            AssignOp::Append => {
                let value = format!(
                    "{}{}",
                    self.ctx.variables.get(&binding.name).unwrap_or_default(),
                    resolved.text
                );
                let candidate = Path::new(&value);
                let target = (candidate.is_absolute() && candidate.exists()).then(|| path::normalize(candidate));
                (value, target)
            }
        };
        debug!("{}: {}{}{value}", site, binding.name, binding.operator.as_str());

        if site.record
            && let Some(target) = target
        {
            let relative = self.resolver().is_location_dependent(&binding.value);
            let directory = self.ctx.cwd.clone();
            // an append is rewritten as a whole `NAME=value` assignment
            let span = match binding.operator {
                AssignOp::Assign => binding.value_span,
                AssignOp::Append => Span::new(
                    binding.value_span.start - binding.name.len() - 2,
                    binding.value_span.end,
                ),
            };
            self.ctx.record(
                site.file,
                site.line,
                Declaration {
                    kind: DeclarationKind::Var {
                        name: binding.name.clone(),
                        operator: binding.operator,
                        raw_value: binding.value.clone(),
                        resolved: target,
                        directory,
                    },
                    span: span.shifted(site.statement.offset),
                    relative,
                },
            );
        }
        self.ctx.variables.set(&binding.name, value);
    }

    fn source(&mut self, site: &Site<'_>, argument: &str) -> Result<()> {
        let resolved = self.resolver().resolve(argument);
        if resolved.dynamic {
            warn!("{}: cannot resolve sourced file {argument}, skipping", site);
            return Ok(());
        }
        let target = match resolved.path {
            Some(path) if path.is_file() => path,
            Some(path) => return Err(site.file_not_found(path.display().to_string())),
            None => return Err(site.file_not_found(resolved.text)),
        };

        let edge = (target.clone(), site.file.to_path_buf());
        let count = self.visits.entry(edge.clone()).or_insert(0);
        *count += 1;
        if *count >= self.recursion_limit && self.chain.contains(&target) {
            return Err(Error::CircularDependency {
                chain: self.chain.clone(),
                offending: target,
            });
        }

        debug!("{}: source {}", site, target.display());
        self.chain.push(target.clone());
        let walked = self.walk(&target);
        self.chain.pop();
        walked?;

        if self.appended.insert(edge) {
            self.order.push(target);
        }
        Ok(())
    }
}

/// Where a statement sits, for recording and diagnostics.
struct Site<'a> {
    file: &'a Path,
    /// Zero-based line index.
    line: usize,
    statement: &'a Statement,
    /// Record declarations (first visit of `file` only).
    record: bool,
}

impl Site<'_> {
    fn file_not_found(&self, target: String) -> Error {
        Error::FileNotFound {
            target,
            referrer: self.file.to_path_buf(),
            line: self.line + 1,
        }
    }

    fn directory_not_found(&self, target: String) -> Error {
        Error::DirectoryNotFound {
            target,
            file: self.file.to_path_buf(),
            line: self.line + 1,
        }
    }
}

impl std::fmt::Display for Site<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line + 1)
    }
}
