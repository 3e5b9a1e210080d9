use crate::error::Result;
use crate::fuzzy::MatchOptions;

use serde::Deserialize;

use std::path::Path;

/// Name of the per-project configuration file, looked up in the project root.
pub const CONFIG_FILE: &str = ".journal-assist.toml";

/// Engine tunables. Every field is optional in the TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of candidates returned per request
    pub max_results: usize,

    pub case_sensitive: bool,

    pub exact_bonus: u32,

    pub prefix_bonus: u32,

    /// An exact match of the token being typed is hidden while its usage
    /// count stays at or below this value.
    pub self_suggestion_threshold: u32,

    /// File extensions recognized as journals, without the leading dot
    pub journal_extensions: Vec<String>,

    /// Bare file names recognized as journals
    pub journal_file_names: Vec<String>,

    /// Directories never entered during a workspace scan, in addition to hidden ones
    pub skip_dirs: Vec<String>,

    /// Entries whose presence marks a directory as a project root
    pub root_markers: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_results: 100,
            case_sensitive: false,
            exact_bonus: 200,
            prefix_bonus: 100,
            self_suggestion_threshold: 2,
            journal_extensions: strings(&["journal", "hledger", "ledger", "j"]),
            journal_file_names: strings(&["journal", ".hledger.journal"]),
            skip_dirs: strings(&["node_modules", "target", "vendor", "dist", "build"]),
            root_markers: strings(&[".git", ".hg", ".jj", CONFIG_FILE]),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<EngineConfig> {
        Ok(toml::from_str(text)?)
    }

    /// Configuration of the project rooted at `root`, or the defaults when the
    /// root carries no configuration file.
    pub fn load(root: &Path) -> Result<EngineConfig> {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.is_file() {
            log::debug!("No {} in {}, using default config", CONFIG_FILE, root.display());
            return Ok(EngineConfig::default());
        }

        let config_str = std::fs::read_to_string(&config_path)?;
        EngineConfig::from_toml_str(&config_str)
    }

    /// Configuration of the project rooted at `root`, falling back to
    /// `fallback` when the root has no configuration file or it is unusable.
    pub fn load_or(root: &Path, fallback: &EngineConfig) -> EngineConfig {
        if !root.join(CONFIG_FILE).is_file() {
            return fallback.clone();
        }

        match EngineConfig::load(root) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Ignoring {} in {}: {}", CONFIG_FILE, root.display(), err);
                fallback.clone()
            }
        }
    }

    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            max_results: self.max_results,
            case_sensitive: self.case_sensitive,
            exact_bonus: self.exact_bonus,
            prefix_bonus: self.prefix_bonus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineConfig, CONFIG_FILE};
    use crate::error::Error;
    use anyhow::Result;

    #[test]
    fn partial_file_keeps_defaults() -> Result<()> {
        let config = EngineConfig::from_toml_str("max_results = 20\nskip_dirs = [\"archive\"]\n")?;
        assert_eq!(config.max_results, 20);
        assert_eq!(config.skip_dirs, vec!["archive"]);
        assert_eq!(config.self_suggestion_threshold, 2);
        assert_eq!(config.match_options().exact_bonus, 200);
        Ok(())
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let err = EngineConfig::from_toml_str("max_results = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_from_root() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(EngineConfig::load(dir.path())?, EngineConfig::default());

        std::fs::write(dir.path().join(CONFIG_FILE), "case_sensitive = true\n")?;
        assert!(EngineConfig::load(dir.path())?.case_sensitive);
        Ok(())
    }

    #[test]
    fn load_or_falls_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let fallback = EngineConfig {
            max_results: 7,
            ..EngineConfig::default()
        };
        assert_eq!(EngineConfig::load_or(dir.path(), &fallback), fallback);

        std::fs::write(dir.path().join(CONFIG_FILE), "max_results = \"many\"\n")?;
        assert_eq!(EngineConfig::load_or(dir.path(), &fallback).max_results, 7);

        std::fs::write(dir.path().join(CONFIG_FILE), "max_results = 1\n")?;
        assert_eq!(EngineConfig::load_or(dir.path(), &fallback).max_results, 1);
        Ok(())
    }
}
