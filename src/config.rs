//! Translator configuration (`sqlshift.toml`).
//!
//! ```toml
//! max_depth = 64
//! include_builtin = true
//! dictionaries = ["rules/", "extra/udfs.json"]
//! output_extension = "presto"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{TranslateError, TranslateResult};
use crate::scanner::{DEFAULT_MAX_DEPTH, MAX_DEPTH_LIMIT};

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "sqlshift.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslatorConfig {
    /// Maximum nesting of parentheses and brackets, at most [`MAX_DEPTH_LIMIT`].
    pub max_depth: usize,
    /// Load the bundled Hive to Presto dictionary.
    pub include_builtin: bool,
    /// Extra rule documents: JSON files, or directories searched recursively.
    pub dictionaries: Vec<PathBuf>,
    /// Extension of files written by `Translator::translate_file`.
    pub output_extension: String,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            include_builtin: true,
            dictionaries: Vec::new(),
            output_extension: "presto".to_string(),
        }
    }
}

impl TranslatorConfig {
    pub fn from_toml_str(content: &str) -> TranslateResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| TranslateError::Config(e.to_string()))?;
        config.validate()
    }

    /// Load a config file. Relative dictionary paths resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> TranslateResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)
            .map_err(|e| TranslateError::Config(format!("{}: {}", path.display(), e)))?;

        if let Some(base) = path.parent() {
            for dictionary in &mut config.dictionaries {
                if dictionary.is_relative() {
                    *dictionary = base.join(&*dictionary);
                }
            }
        }
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the first config file found in [`TranslatorConfig::search_paths`].
    pub fn discover() -> TranslateResult<Option<Self>> {
        match Self::search_paths().into_iter().find(|path| path.is_file()) {
            Some(path) => Self::load(path).map(Some),
            None => Ok(None),
        }
    }

    /// `./sqlshift.toml`, then `sqlshift/config.toml` under the user config directory.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("sqlshift").join("config.toml"));
        }
        paths
    }

    fn validate(mut self) -> TranslateResult<Self> {
        if self.max_depth == 0 {
            return Err(TranslateError::Config(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.max_depth > MAX_DEPTH_LIMIT {
            return Err(TranslateError::Config(format!(
                "max_depth must be at most {}, found {}",
                MAX_DEPTH_LIMIT, self.max_depth
            )));
        }
        self.output_extension = self.output_extension.trim_start_matches('.').to_string();
        if self.output_extension.is_empty() {
            return Err(TranslateError::Config(
                "output_extension cannot be empty".to_string(),
            ));
        }
        Ok(self)
    }
}
