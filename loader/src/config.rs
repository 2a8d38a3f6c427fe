//! Tool configuration.
//!
//! Defines the YAML-serializable settings shared by every `oas-toolkit`
//! command. Every key is optional.
//!
//! # Example YAML
//!
//! ```yaml
//! log_level: info
//! layout:
//!   start: main
//!   checks:
//!     op_order: false
//! diff:
//!   scalar_sets: true
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;

use oas_toolkit_core::{DEFAULT_START, DiffOptions, LayoutChecks};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LoadError, Result};

/// Configuration file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = ".oas-toolkit.yml";

/// Settings for layout commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Identifier of the root command node.
    pub start: String,
    /// Lint checks to run.
    pub checks: LayoutChecks,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            start: DEFAULT_START.to_string(),
            checks: LayoutChecks::default(),
        }
    }
}

/// Top-level tool configuration.
///
/// # Examples
///
/// ```
/// use oas_toolkit_loader::ToolConfig;
///
/// let config: ToolConfig = serde_yaml::from_str("diff:\n  scalar_sets: true\n").unwrap();
/// assert!(config.diff.scalar_sets);
/// assert_eq!(config.layout.start, "main");
/// assert!(config.layout.checks.op_dups);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Log level used when `--log-level` is not given (`error` .. `trace`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    pub layout: LayoutConfig,
    pub diff: DiffOptions,
}

impl ToolConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`NotFound`](LoadError::NotFound) if the file does not exist,
    /// [`IoError`](LoadError::IoError) if it cannot be read, or
    /// [`YamlError`](LoadError::YamlError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(std::fs::File::open(path)?);
        // an empty file is a null document; treat it as all defaults
        let config: Option<Self> = serde_yaml::from_reader(reader)?;
        Ok(config.unwrap_or_default())
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](LoadError::IoError) if the file cannot be written,
    /// or [`YamlError`](LoadError::YamlError) if serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(std::fs::File::create(path)?);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Loads `path` when given; otherwise [`DEFAULT_CONFIG_FILE`] if it
    /// exists, or defaults.
    ///
    /// An explicitly named file must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    debug!(path = DEFAULT_CONFIG_FILE, "using configuration file");
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "log_level: debug\nlayout:\n  checks:\n    op_order: false\n";
        let config: ToolConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.layout.start, "main");
        assert!(!config.layout.checks.op_order);
        assert!(config.layout.checks.pagination);
        assert!(!config.diff.scalar_sets);
    }

    #[test]
    fn test_default_round_trips_through_yaml() {
        let config = ToolConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: ToolConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
