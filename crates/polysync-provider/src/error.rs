//! Error types for backend providers.

use polysync_core::CoreError;
use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur while talking to a policy backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// Malformed credential blob or missing required fields.
    #[error("configuration error: {0}")]
    Config(String),

    /// The backend reported a failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// No provider is registered under this name.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// A provider with this name is already registered.
    #[error("provider already registered: {0}")]
    DuplicateProvider(String),

    /// The requested application or object does not exist on the backend.
    #[error("not found: {0}")]
    NotFound(String),

    /// A policy bundle could not be read or written.
    #[error("bundle error: {0}")]
    Bundle(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Create an unknown provider error.
    pub fn unknown_provider(name: impl Into<String>) -> Self {
        Self::UnknownProvider(name.into())
    }

    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a bundle error.
    pub fn bundle(message: impl Into<String>) -> Self {
        Self::Bundle(message.into())
    }

    /// Check if this is a configuration error.
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::UnknownProvider(_))
    }

    /// Check if retrying the same call may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Io(_) | Self::Http(_))
    }
}

impl From<CoreError> for ProviderError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Json(e) => Self::Json(e),
            other if other.is_config() => Self::Config(other.to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}
