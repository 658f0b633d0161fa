//! Configuration module: loads field table overrides from a JSON file

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse JSON config file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Extra field classifications, each mapping a canonical field to its aliases.
///
/// ```json
/// { "stack_only": { "owner": ["assignee"] }, "non_invertible": { "environment": [] } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub stack_only: HashMap<String, Vec<String>>,
    pub stack_only_virtual: HashMap<String, Vec<String>>,
    pub non_invertible: HashMap<String, Vec<String>>,
    pub shared: HashMap<String, Vec<String>>,
}

impl FieldConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.to_path_buf()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path_ref.to_path_buf(),
            source,
        })
    }

    /// Number of canonical fields across all sections
    pub fn field_count(&self) -> usize {
        self.stack_only.len()
            + self.stack_only_virtual.len()
            + self.non_invertible.len()
            + self.shared.len()
    }
}
