//! Error types for scheduling and dispatch.

use thiserror::Error;

/// Result type for task operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Boxed error carried out of a worker.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during task operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A worker reported failure for its task.
    #[error("worker failed: {0}")]
    Worker(#[source] BoxError),

    /// A dispatched task panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Failed to dispatch a task.
    #[error("failed to dispatch task: {0}")]
    SpawnFailed(String),

    /// Invalid scheduler or dispatcher configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The scheduler was started twice.
    #[error("scheduler already running")]
    AlreadyRunning,

    /// Scheduler is not running.
    #[error("scheduler not running")]
    SchedulerNotRunning,
}

impl TaskError {
    /// Wrap a worker failure.
    pub fn worker(err: impl Into<BoxError>) -> Self {
        Self::Worker(err.into())
    }

    /// Create a panicked error.
    pub fn panicked(reason: impl Into<String>) -> Self {
        Self::Panicked(reason.into())
    }

    /// Create a spawn failed error.
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed(reason.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Check if the task may succeed when offered again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SpawnFailed(_) | Self::Worker(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let _ = TaskError::worker("backend unavailable");
        let _ = TaskError::panicked("index out of bounds");
        let _ = TaskError::spawn_failed("no capacity");
        let _ = TaskError::invalid_config("delay must be positive");
    }

    #[test]
    fn test_worker_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "gateway timeout");
        let err = TaskError::worker(io);
        assert!(err.to_string().contains("gateway timeout"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(TaskError::spawn_failed("").is_recoverable());
        assert!(TaskError::worker("x").is_recoverable());
        assert!(!TaskError::panicked("").is_recoverable());
        assert!(!TaskError::AlreadyRunning.is_recoverable());
    }
}
