use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::parse::{AssignOp, SetOptions, Span};

/// Variable bindings in definition order. Later assignments overwrite the
/// value but keep the original position.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VariableTable {
    entries: Vec<(String, String)>,
}

impl VariableTable {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// What a recorded line did to directory or path state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeclarationKind {
    /// `cd ARG` that moved to `resolved`.
    Cd {
        argument: String,
        resolved: PathBuf,
    },
    /// `NAME=value` whose value resolved to an existing path.
    Var {
        name: String,
        #[serde(serialize_with = "serialize_op")]
        operator: AssignOp,
        raw_value: String,
        resolved: PathBuf,
        directory: PathBuf,
    },
}

fn serialize_op<S: serde::Serializer>(op: &AssignOp, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(op.as_str())
}

/// A `cd` or path-valued assignment recorded at a specific line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Declaration {
    #[serde(flatten)]
    pub kind: DeclarationKind,
    /// Byte range in the line to replace when rewriting: the whole
    /// `cd ARG` for a cd, the right-hand side for an assignment.
    #[serde(skip)]
    pub span: Span,
    /// Whether the raw argument depends on where the script runs from.
    pub relative: bool,
}

/// Per file, per zero-based line number, the declarations found there.
pub type PathDeclarations = HashMap<PathBuf, BTreeMap<usize, Vec<Declaration>>>;

/// Everything the walk learns about the project, shared by all files of
/// one resolution run the way a single shell process would share it.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub variables: VariableTable,
    /// Tracked working directory. Never applied to the real process.
    pub cwd: PathBuf,
    /// Previous working directory, for `cd -`.
    pub oldpwd: PathBuf,
    pub declarations: PathDeclarations,
    /// `set` options declared at top level, per file.
    pub set_options: HashMap<PathBuf, SetOptions>,
    /// File currently being walked; backs `BASH_SOURCE`.
    pub current_file: PathBuf,
}

impl ResolutionContext {
    /// Start a run for `entry` (absolute, normalized): `$0` names the entry
    /// point and the working directory is its directory.
    pub fn new(entry: &Path) -> Self {
        let dir = entry.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/"));
        let mut variables = VariableTable::default();
        variables.set("0", entry.display().to_string());
        Self {
            variables,
            cwd: dir.clone(),
            oldpwd: dir,
            declarations: HashMap::new(),
            set_options: HashMap::new(),
            current_file: entry.to_path_buf(),
        }
    }

    /// Move the tracked working directory.
    pub fn change_dir(&mut self, dir: PathBuf) {
        self.oldpwd = std::mem::replace(&mut self.cwd, dir);
    }

    pub fn record(&mut self, file: &Path, line: usize, declaration: Declaration) {
        self.declarations
            .entry(file.to_path_buf())
            .or_default()
            .entry(line)
            .or_default()
            .push(declaration);
    }

    pub fn declarations_for(&self, file: &Path) -> Option<&BTreeMap<usize, Vec<Declaration>>> {
        self.declarations.get(file)
    }

    pub fn add_set_options(&mut self, file: &Path, options: &SetOptions) {
        self.set_options
            .entry(file.to_path_buf())
            .or_default()
            .merge(options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_overwrites_in_place() {
        let mut table = VariableTable::default();
        table.set("A", "1");
        table.set("B", "2");
        table.set("A", "3");
        let items: Vec<_> = table.iter().collect();
        assert_eq!(items, vec![("A", "3"), ("B", "2")]);
    }

    #[test]
    fn new_context_seeds_entry() {
        let ctx = ResolutionContext::new(Path::new("/proj/main.sh"));
        assert_eq!(ctx.variables.get("0"), Some("/proj/main.sh"));
        assert_eq!(ctx.cwd, PathBuf::from("/proj"));
    }

    #[test]
    fn change_dir_remembers_previous() {
        let mut ctx = ResolutionContext::new(Path::new("/proj/main.sh"));
        ctx.change_dir(PathBuf::from("/tmp"));
        assert_eq!(ctx.oldpwd, PathBuf::from("/proj"));
        assert_eq!(ctx.cwd, PathBuf::from("/tmp"));
    }

    #[test]
    fn declarations_keep_line_order() {
        let mut ctx = ResolutionContext::new(Path::new("/p/m.sh"));
        let file = Path::new("/p/m.sh");
        let decl = |dir: &str| Declaration {
            kind: DeclarationKind::Cd {
                argument: dir.into(),
                resolved: PathBuf::from(dir),
            },
            span: Span::new(0, 4),
            relative: false,
        };
        ctx.record(file, 3, decl("/b"));
        ctx.record(file, 1, decl("/a"));
        ctx.record(file, 3, decl("/c"));
        let lines = ctx.declarations_for(file).unwrap();
        assert_eq!(lines.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(lines[&3].len(), 2);
    }
}
