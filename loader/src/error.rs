//! Error types for loading documents, layouts and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading input files.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The named input file does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The input parsed but is not a usable API description.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The input parsed but is not a usable layout.
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}

/// Convenience alias for results with [`LoadError`].
pub type Result<T> = std::result::Result<T, LoadError>;
