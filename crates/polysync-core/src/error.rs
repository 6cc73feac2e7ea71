//! Error types for the canonical policy model.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while handling canonical policy data.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A backend RAR key could not be decoded.
    #[error("malformed resource-action-role key: {0}")]
    MalformedKey(String),

    /// An integration credential blob could not be decoded.
    #[error("invalid credentials for integration {integration}: {message}")]
    InvalidCredentials {
        /// Integration (provider) name.
        integration: String,
        /// Decoder message.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a malformed key error.
    pub fn malformed_key(key: impl Into<String>) -> Self {
        Self::MalformedKey(key.into())
    }

    /// Create an invalid credentials error.
    pub fn invalid_credentials(integration: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCredentials {
            integration: integration.into(),
            message: message.into(),
        }
    }

    /// Check if this is a configuration problem rather than a data problem.
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::InvalidCredentials { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_key_display() {
        let err = CoreError::malformed_key("resrol-");
        assert_eq!(
            err.to_string(),
            "malformed resource-action-role key: resrol-"
        );
    }

    #[test]
    fn test_invalid_credentials_is_config() {
        let err = CoreError::invalid_credentials("open_policy_agent", "missing field");
        assert!(err.is_config());
        assert!(err.to_string().contains("open_policy_agent"));
        assert!(!CoreError::malformed_key("x").is_config());
    }
}
