use std::path::PathBuf;

use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Terminal level for `-v` (repeatable) and `-q`.
pub fn level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// ~/.local/share/shmerge/shmerge.log
pub fn log_file_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".local/share/shmerge/shmerge.log"))
}

/// Install the global logger: stderr at `level`, plus a debug-level file
/// log when `log_file` is set. Best-effort: a log file that cannot be
/// opened, or a logger that is already installed, is silently skipped.
pub fn init(level: LevelFilter, log_file: bool) {
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if log_file && let Some(file) = open_log_file() {
        let file_config = ConfigBuilder::new().set_target_level(LevelFilter::Off).build();
        loggers.push(WriteLogger::new(LevelFilter::Debug, file_config, file));
    }
    let _ = CombinedLogger::init(loggers);
}

fn open_log_file() -> Option<std::fs::File> {
    let path = log_file_path()?;
    let _ = std::fs::create_dir_all(path.parent()?);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level(0, false), LevelFilter::Warn);
        assert_eq!(level(1, false), LevelFilter::Info);
        assert_eq!(level(2, false), LevelFilter::Debug);
        assert_eq!(level(7, false), LevelFilter::Trace);
        assert_eq!(level(3, true), LevelFilter::Error);
    }

    #[test]
    fn log_file_lives_under_home() {
        if let Some(path) = log_file_path() {
            assert!(path.ends_with(".local/share/shmerge/shmerge.log"));
        }
    }
}
