use crate::error::Result;
use crate::table::DEFAULT_REMOVE_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options for opening a [`Database`](crate::Database).
///
/// Usually loaded from a YAML file kept outside the database directory,
/// since every file inside that directory is treated as a table:
///
/// ```yaml
/// remove_limit: 500
/// create_directory: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default cap for `Table::remove_rows`.
    pub remove_limit: usize,
    /// Create the database directory if it does not exist yet.
    pub create_directory: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            remove_limit: DEFAULT_REMOVE_LIMIT,
            create_directory: false,
        }
    }
}

impl Config {
    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse a config from a YAML string. Missing keys take their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }
}
