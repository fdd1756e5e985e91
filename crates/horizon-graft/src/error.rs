//! Error types for the row list engine.

use std::path::PathBuf;

use horizon_graft_dom::DomError;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating a [`RowListConfig`](crate::RowListConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A configured selector does not parse.
    #[error("Invalid selector in '{field}': {source}")]
    InvalidSelector {
        field: &'static str,
        #[source]
        source: DomError,
    },

    /// A configured value is out of range.
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },
}

impl ConfigError {
    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a value error.
    pub fn invalid_value(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

/// Result type alias for row list operations.
pub type Result<T> = std::result::Result<T, GraftError>;

/// Top-level error type for the row list engine.
#[derive(Debug, thiserror::Error)]
pub enum GraftError {
    /// Host document error.
    #[error(transparent)]
    Dom(#[from] DomError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
