use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::resolve::UnresolvedPolicy;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub header: Header,
    #[serde(default)]
    pub banner: Banner,
    #[serde(default)]
    pub rewrite: Rewrite,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub recursion_limit: u32,
    #[serde(default)]
    pub unresolved_variables: UnresolvedPolicy,
    #[serde(default)]
    pub log_file: bool,
}

/// First lines of the merged script.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Header {
    #[serde(default)]
    pub shebang: String,
    /// Arguments of a `set` command every merged script starts with,
    /// e.g. `-eEuo pipefail`.
    #[serde(default)]
    pub strict_mode: String,
}

/// Comment block that precedes each merged file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Banner {
    #[serde(default)]
    pub width: usize,
    #[serde(default)]
    pub delimiter: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Rewrite {
    /// Command that does nothing; stands in for neutralized statements.
    #[serde(default)]
    pub noop: String,
    /// Expression for "this script", used where a variable held the path
    /// of a file that is now inlined.
    #[serde(default)]
    pub self_reference: String,
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    header: HeaderOverlay,
    #[serde(default)]
    banner: BannerOverlay,
    #[serde(default)]
    rewrite: RewriteOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsOverlay {
    recursion_limit: Option<u32>,
    unresolved_variables: Option<UnresolvedPolicy>,
    log_file: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct HeaderOverlay {
    shebang: Option<String>,
    strict_mode: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct BannerOverlay {
    width: Option<usize>,
    delimiter: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RewriteOverlay {
    noop: Option<String>,
    self_reference: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Embedded defaults merged with ~/.config/shmerge/config.toml, if it
    /// exists. A user file that does not parse is reported and skipped.
    pub fn load() -> Result<Self> {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_overlay() {
            config.apply_overlay(overlay);
        }
        config.validate()?;
        Ok(config)
    }

    /// Embedded defaults merged with an explicitly named file. Any problem
    /// with that file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let overlay: ConfigOverlay =
            toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::default_config();
        config.apply_overlay(overlay);
        config.validate()?;
        Ok(config)
    }

    fn user_config_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(Path::new(&home).join(".config/shmerge/config.toml"))
    }

    /// Try to load user overlay from ~/.config/shmerge/config.toml.
    fn load_overlay() -> Option<ConfigOverlay> {
        let path = Self::user_config_path()?;
        let content = std::fs::read_to_string(&path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                eprintln!("shmerge: config parse error in {}: {e}", path.display());
                None
            }
        }
    }

    /// Apply an overlay on top of this config. Scalars override.
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        let s = overlay.settings;
        if let Some(v) = s.recursion_limit {
            self.settings.recursion_limit = v;
        }
        if let Some(v) = s.unresolved_variables {
            self.settings.unresolved_variables = v;
        }
        if let Some(v) = s.log_file {
            self.settings.log_file = v;
        }

        let h = overlay.header;
        if let Some(v) = h.shebang {
            self.header.shebang = v;
        }
        if let Some(v) = h.strict_mode {
            self.header.strict_mode = v;
        }

        let b = overlay.banner;
        if let Some(v) = b.width {
            self.banner.width = v;
        }
        if let Some(v) = b.delimiter {
            self.banner.delimiter = v;
        }

        let r = overlay.rewrite;
        if let Some(v) = r.noop {
            self.rewrite.noop = v;
        }
        if let Some(v) = r.self_reference {
            self.rewrite.self_reference = v;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.settings.recursion_limit == 0 {
            return Err(Error::Config("settings.recursion_limit must be at least 1".into()));
        }
        if self.banner.delimiter.chars().count() != 1 {
            return Err(Error::Config("banner.delimiter must be a single character".into()));
        }
        if self.rewrite.noop.trim().is_empty() {
            return Err(Error::Config("rewrite.noop must not be empty".into()));
        }
        Ok(())
    }

    /// Effective configuration as TOML, for `--dump-config`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}
