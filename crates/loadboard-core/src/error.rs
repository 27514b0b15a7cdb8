//! Error types for the loadboard core crate

use thiserror::Error;

/// Result type alias using the core [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading configuration or validating core values
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// A value failed validation
    #[error("Validation error: {field} - {message}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// Date or time could not be parsed
    #[error("Invalid date '{input}': {source}")]
    InvalidDate {
        /// Raw input
        input: String,
        /// Parser error
        #[source]
        source: chrono::ParseError,
    },

    /// Configuration source error
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new configuration error
    #[must_use]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new validation error
    #[must_use]
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}
