//! Error types for the dashboard aggregator

use thiserror::Error;

/// Result type alias for dashboard operations
pub type DashboardResult<T> = Result<T, DashboardError>;

/// Errors that can occur while refreshing or driving the dashboard
#[derive(Error, Debug)]
pub enum DashboardError {
    /// The backend answered with an error
    #[error("Backend error: {message}")]
    Backend {
        /// Error message reported by the backend
        message: String,
    },

    /// A backend record could not be decoded into the expected shape
    #[error("Failed to decode {model} record: {source}")]
    Decode {
        /// Model the record belongs to
        model: String,
        /// Decoder error
        #[source]
        source: serde_json::Error,
    },

    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] loadboard_core::Error),

    /// A realtime subscription could not be established
    #[error("Subscription to '{topic}' failed: {message}")]
    Subscription {
        /// Bus topic
        topic: String,
        /// Error message
        message: String,
    },

    /// The controller is not active
    #[error("Dashboard is not active")]
    NotActive,

    /// The controller is already active
    #[error("Dashboard is already active")]
    AlreadyActive,
}

impl DashboardError {
    /// Create a new backend error
    #[must_use]
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create a new decode error
    #[must_use]
    pub fn decode<S: Into<String>>(model: S, source: serde_json::Error) -> Self {
        Self::Decode {
            model: model.into(),
            source,
        }
    }

    /// Create a new subscription error
    #[must_use]
    pub fn subscription<T: Into<String>, S: Into<String>>(topic: T, message: S) -> Self {
        Self::Subscription {
            topic: topic.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_backend_error_display() {
        let error = DashboardError::backend("Access Denied");
        assert_eq!(error.to_string(), "Backend error: Access Denied");
    }

    #[test]
    fn test_decode_error_names_model() {
        let source = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let error = DashboardError::decode("fleet.vehicle", source);
        assert!(error.to_string().starts_with("Failed to decode fleet.vehicle record"));
    }

    #[test]
    fn test_core_error_is_transparent() {
        let error = DashboardError::from(loadboard_core::Error::configuration("bad"));
        assert_eq!(error.to_string(), "Configuration error: bad");
    }
}
