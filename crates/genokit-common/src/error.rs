//! Error types shared across genokit crates

use thiserror::Error;

/// Result type alias for genokit operations
pub type Result<T> = std::result::Result<T, GenokitError>;

/// Errors that are not owned by a single pipeline component
#[derive(Error, Debug)]
pub enum GenokitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

impl GenokitError {
    /// Shorthand for an unparsable setting
    pub fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        GenokitError::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }
}
