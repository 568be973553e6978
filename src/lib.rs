//! shmerge: bundle a multi-file bash project into one self-contained script.
//!
//! Starting from an entry script, every file pulled in with `source` or `.`
//! is discovered while tracking the variables and working directory a shell
//! would have at that point. The files are then concatenated dependency-first
//! behind a single reconciled `set` header, with `source` statements removed
//! and `cd`/path assignments rewritten to stay correct in one file.
//!
//! # Architecture
//!
//! - **[`parse`]**: quote-aware line scanner and statement classifier.
//! - **[`resolve`]**: variable, command-substitution and path resolution.
//! - **[`deps`]**: the dependency walk over `source` statements.
//! - **[`compile`]**: content extraction, rewriting and header assembly.
//! - **[`config`]**: embedded defaults + user overlay merge.
//! - **[`logging`]**: `simplelog` setup for the command line.

/// Content extraction, line rewriting and header/banner assembly.
pub mod compile;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Dependency walk over `source` statements.
pub mod deps;
/// Error taxonomy.
pub mod error;
/// Terminal and file logging.
pub mod logging;
/// Shell line scanning and statement classification.
pub mod parse;
/// Variable and path resolution.
pub mod resolve;

pub use compile::{compile, compile_to_string};
pub use config::Config;
pub use deps::{Resolution, resolve_dependencies};
pub use error::{Error, Result};

/// Compile `entry` with the default configuration and return the merged
/// script. This is the main entry point for tests and simple usage.
pub fn bundle(entry: &std::path::Path) -> Result<String> {
    compile_to_string(entry, &Config::default_config())
}
