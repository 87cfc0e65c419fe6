use crate::caching::{CachingLevel, QuantityFilter};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Per-parse settings. Every field has a default, so an options file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Version whose rules to use. Detected from the header when absent.
    pub version: Option<String>,
    /// Quantities to forward; empty forwards everything not skipped.
    pub keep: Vec<String>,
    /// Quantities that are matched but never forwarded.
    pub skip: Vec<String>,
    /// Caching level overrides by quantity name.
    pub caching: HashMap<String, CachingLevel>,
    /// Read the trajectory and energy files an MD run names.
    pub read_auxiliary_files: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            version: None,
            keep: Vec::new(),
            skip: Vec::new(),
            caching: HashMap::new(),
            read_auxiliary_files: true,
        }
    }
}

impl ParserOptions {
    /// Reads options from a JSON file. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] if the file cannot be read, [`ConfigError::Parse`]
    /// if it is not a valid options object.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The keep and skip lists as a filter.
    pub fn filter(&self) -> QuantityFilter {
        QuantityFilter::new(self.keep.iter().cloned(), self.skip.iter().cloned())
    }
}
