use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RELATIONAL_DB: &str = "./apprentice_hub.sqlite3";
pub const DEFAULT_DOCUMENT_DB: &str = "./apprentice_hub_evidence.sqlite3";

/// Locations of the two stores backing the hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    pub relational_db: PathBuf,
    pub document_db: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreConfigFile {
    relational_db: Option<PathBuf>,
    document_db: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            relational_db: PathBuf::from(DEFAULT_RELATIONAL_DB),
            document_db: PathBuf::from(DEFAULT_DOCUMENT_DB),
        }
    }
}

impl StoreConfig {
    /// Load a YAML config file. Keys missing from the file fall back to defaults.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or is not a valid store config.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        Self::resolve(Some(path), None, None)
    }

    /// Resolve store locations: explicit values win over the config file, which
    /// wins over the defaults.
    ///
    /// # Errors
    /// Returns an error when `config_file` is given but cannot be loaded.
    pub fn resolve(
        config_file: Option<&Path>,
        relational_db: Option<PathBuf>,
        document_db: Option<PathBuf>,
    ) -> Result<Self> {
        let file = match config_file {
            Some(path) => load_config_file(path)?,
            None => StoreConfigFile::default(),
        };
        let defaults = Self::default();

        Ok(Self {
            relational_db: relational_db.or(file.relational_db).unwrap_or(defaults.relational_db),
            document_db: document_db.or(file.document_db).unwrap_or(defaults.document_db),
        })
    }
}

fn load_config_file(path: &Path) -> Result<StoreConfigFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(StoreConfigFile::default());
    }
    serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}
