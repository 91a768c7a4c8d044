//! Configuration for the index CLI and extraction passes
//!
//! Layered loading: built-in defaults, then an optional config file
//! (`supertag-index.toml`), then `SUPERTAG_INDEX_*` environment variables.
//!
//! ## Example config file (supertag-index.toml):
//! ```toml
//! [database]
//! path = "./index.db"
//!
//! [index]
//! include_trashed = false
//!
//! [values]
//! excluded_fields = ["Created At"]
//! include_nested = true
//! nested_depth = 2
//! ```

use std::path::{Path, PathBuf};

use config_crate::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Main configuration for the supertag index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub index: IndexingConfig,

    #[serde(default)]
    pub values: ValuesConfig,
}

/// Where the relational index lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Options for the tag-definition pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Index trashed tags (flagged) instead of skipping them.
    #[serde(default)]
    pub include_trashed: bool,
}

/// Options for the field-value pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuesConfig {
    /// Field display names to skip entirely.
    #[serde(default)]
    pub excluded_fields: Vec<String>,

    /// Concatenate nested child names into value texts.
    #[serde(default)]
    pub include_nested: bool,

    #[serde(default = "default_nested_depth")]
    pub nested_depth: usize,
}

impl Default for ValuesConfig {
    fn default() -> Self {
        Self {
            excluded_fields: Vec::new(),
            include_nested: false,
            nested_depth: default_nested_depth(),
        }
    }
}

fn default_nested_depth() -> usize {
    2
}

fn default_database_path() -> PathBuf {
    ProjectDirs::from("", "", "supertag-index")
        .map(|dirs| dirs.data_dir().join("index.db"))
        .unwrap_or_else(|| PathBuf::from("supertag-index.db"))
}

impl IndexConfig {
    /// Load configuration, optionally from an explicit file path.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let builder = match path {
            Some(path) => Config::builder().add_source(File::from(path.to_path_buf())),
            None => Config::builder().add_source(File::with_name("supertag-index").required(false)),
        };
        let settings = builder
            .add_source(Environment::with_prefix("SUPERTAG_INDEX").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Effective configuration rendered as TOML, for `supertag-index config`.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
