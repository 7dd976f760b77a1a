//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file was given
    #[error("no configuration file specified")]
    NoFile,

    /// The file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file extension maps to no known format
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// The content did not deserialize
    #[error("failed to parse {format} configuration: {message}")]
    Parse {
        /// Format name
        format: &'static str,
        /// Parser message
        message: String,
    },

    /// The configuration deserialized but is inconsistent
    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl ConfigError {
    /// Validation problems, empty for other kinds
    #[must_use]
    pub fn problems(&self) -> &[String] {
        match self {
            Self::Validation(problems) => problems,
            _ => &[],
        }
    }
}
