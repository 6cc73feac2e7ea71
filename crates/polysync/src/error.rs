//! Agent error type.

use polysync_provider::ProviderError;
use polysync_tasks::TaskError;
use thiserror::Error;

/// Result type for agent assembly and lifecycle.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors raised while assembling or starting the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Building the provider registry failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The scheduler refused to start.
    #[error(transparent)]
    Task(#[from] TaskError),
}
