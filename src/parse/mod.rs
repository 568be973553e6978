pub mod shell;
pub mod tokenize;
pub mod types;

pub use shell::{
    MultilineQuotes, brace_delta, find_substitutions, split_statements, split_words,
};
pub use tokenize::{classify, is_name, strip_quotes, tokenize, unquote};
pub use types::{AssignOp, Assignment, Command, SetOptions, Span, Statement};
