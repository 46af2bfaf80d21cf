// Configuration file handling

use crate::store::{HeaderPolicy, RowStore, StoreOptions};
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, debug};

/// Settings read from `sheetstore.yml`
///
/// Every field is optional in the file; missing ones take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Workbook to operate on
    pub file: PathBuf,
    /// Sheet treated as the table
    pub sheet: String,
    /// Header derivation when saving
    pub header: HeaderPolicy,
    /// Fail update/delete when nothing matches
    pub require_match_on_write: bool,
    /// Log level used when no -v flag is given
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file: PathBuf::from("example.xlsx"),
            sheet: RowStore::DEFAULT_SHEET.to_string(),
            header: HeaderPolicy::default(),
            require_match_on_write: false,
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Default location: `<config dir>/sheetstore/sheetstore.yml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sheetstore").join("sheetstore.yml"))
    }

    /// Load from an explicit path, or from the default location if a file exists there
    ///
    /// An explicit path must exist; a missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config
            .level()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(file = ?path, "Loaded config");
        Ok(config)
    }

    /// Parsed `log-level` (error, warn, info, debug or trace)
    pub fn level(&self) -> Result<Level> {
        self.log_level
            .parse()
            .map_err(|_| eyre!("unknown log-level {:?}, expected error, warn, info, debug or trace", self.log_level))
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            header: self.header,
            require_match_on_write: self.require_match_on_write,
        }
    }
}
