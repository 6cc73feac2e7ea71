//! Error types for synchronization and discovery.

use http::StatusCode;
use polysync_provider::ProviderError;
use thiserror::Error;

/// Result type for orchestration operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing policy between applications.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// An application id was empty.
    #[error("missing {0} application id")]
    MissingApplicationId(&'static str),

    /// No application is registered under this id.
    #[error("application not found: {0}")]
    ApplicationNotFound(String),

    /// No integration is registered under this id.
    #[error("integration not found: {0}")]
    IntegrationNotFound(String),

    /// Source and destination policies cannot be paired.
    #[error("policy shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The destination accepted the call but answered with a failure status.
    #[error("provider {provider} returned unexpected status {status}")]
    UnexpectedStatus {
        /// Provider name.
        provider: String,
        /// Returned status.
        status: StatusCode,
    },

    /// A provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The application catalog failed.
    #[error("catalog error: {0}")]
    Catalog(String),
}

impl SyncError {
    /// Create a shape mismatch error.
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch(message.into())
    }

    /// Create a catalog error.
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }

    /// Check if the caller must fix data or configuration before retrying.
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::MissingApplicationId(_)
                | Self::ApplicationNotFound(_)
                | Self::IntegrationNotFound(_)
                | Self::ShapeMismatch(_)
        )
    }

    /// Check if retrying the same call may succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Catalog(_) => true,
            _ => false,
        }
    }
}
