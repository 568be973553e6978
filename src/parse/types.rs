//! Types produced by the shell scanner and consumed by the walker and compiler.

use std::collections::BTreeSet;

/// Byte range within a single script line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Shift the span right by `offset` bytes.
    pub fn shifted(self, offset: usize) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
        }
    }

    pub fn slice(self, text: &str) -> &str {
        &text[self.start..self.end]
    }
}

/// One logical statement of a line: the text between unquoted
/// separators (`;`, `&&`, `||`, `|`, `&`) and before any comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Statement text with surrounding whitespace trimmed.
    pub text: String,
    /// Byte offset of `text` within the line it was split from.
    pub offset: usize,
}

/// Assignment operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    /// `NAME=value`
    Assign,
    /// `NAME+=value`
    Append,
}

impl AssignOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Append => "+=",
        }
    }
}

/// A single `NAME=value` binding found in a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub operator: AssignOp,
    /// Raw right-hand side, quotes and substitutions included.
    pub value: String,
    /// Location of `value`, relative to the classified statement text.
    pub value_span: Span,
}

/// Options collected from `set` declarations.
///
/// Letters come from `-xyz` groups; `-o NAME` contributes a long option.
/// A `-o` with nothing after it is kept as a bare flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub letters: BTreeSet<char>,
    pub long: Vec<String>,
    pub bare_o: bool,
}

impl SetOptions {
    pub fn is_empty(&self) -> bool {
        self.letters.is_empty() && self.long.is_empty() && !self.bare_o
    }

    /// Union `other` into `self`, keeping long options in first-seen order.
    pub fn merge(&mut self, other: &SetOptions) {
        self.letters.extend(other.letters.iter().copied());
        for name in &other.long {
            if !self.long.contains(name) {
                self.long.push(name.clone());
            }
        }
        self.bare_o |= other.bare_o;
    }
}

/// Classification of one statement, as far as bundling cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `cd [ARG]`. `span` covers the command word through its argument.
    Cd { argument: Option<String>, span: Span },
    /// `source ARG ...` or `. ARG ...`. `keyword` covers the command word.
    Source {
        argument: String,
        keyword: Span,
        span: Span,
    },
    /// One or more persistent variable bindings.
    Assign(Vec<Assignment>),
    /// `set ...`
    Set(SetOptions),
    /// `name() {` or `function name {`
    FunctionDef { name: String },
    /// Anything else, or a statement that could not be parsed.
    Other,
}
