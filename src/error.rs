use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors. Any of these aborts the whole compile.
#[derive(Debug, Error)]
pub enum Error {
    /// The entry point is missing or not a regular file.
    #[error("entry point is not an existing file: {}", .0.display())]
    EntryPointInvalid(PathBuf),

    /// A `source` target does not resolve to an existing file.
    #[error("sourced file not found: {target} (sourced from {}:{line})", .referrer.display())]
    FileNotFound {
        target: String,
        referrer: PathBuf,
        line: usize,
    },

    /// A `cd` target does not resolve to an existing directory.
    #[error("directory not found: {target} (cd in {}:{line})", .file.display())]
    DirectoryNotFound {
        target: String,
        file: PathBuf,
        line: usize,
    },

    /// The recursion guard tripped on a cyclic `source` graph.
    #[error("circular dependency: {} is sourced again via {}", .offending.display(), render_chain(.chain))]
    CircularDependency {
        chain: Vec<PathBuf>,
        offending: PathBuf,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

fn render_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, Error>;
