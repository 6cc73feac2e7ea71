//! Bounded fire-and-forget dispatch.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{debug, info, warn};

use crate::error::{TaskError, TaskResult};
use crate::task::{DispatchId, DispatchOutcome, DispatchStats};

/// Default cap on concurrently running dispatched tasks.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1000;

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of tasks running at once.
    pub max_in_flight: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl DispatcherConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the in-flight cap.
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }
}

/// Spawns detached tasks, refusing new work past the in-flight cap.
///
/// Cloning is cheap; clones share the cap and the statistics.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: DispatcherConfig,
    stats: Arc<DispatchStats>,
    running: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Create a dispatcher with default configuration.
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Create a dispatcher with custom configuration.
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            config,
            stats: Arc::new(DispatchStats::new()),
            running: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Dispatch statistics.
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Number of tasks currently running.
    pub fn running_count(&self) -> u64 {
        self.running.load(Ordering::Acquire)
    }

    /// Check if the dispatcher refuses new work.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Spawn a task without waiting for it.
    ///
    /// The task's `Result` decides whether it counts as completed or
    /// erroneous; a panic counts as erroneous.
    pub fn dispatch<F>(&self, name: impl Into<String>, task: F) -> TaskResult<DispatchId>
    where
        F: Future<Output = TaskResult<()>> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(TaskError::spawn_failed("dispatcher is shut down"));
        }

        let max = self.config.max_in_flight as u64;
        if self
            .running
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .is_err()
        {
            self.stats.record(DispatchOutcome::Rejected);
            return Err(TaskError::spawn_failed(format!(
                "max in-flight tasks ({}) reached",
                self.config.max_in_flight
            )));
        }

        let name = name.into();
        let id = DispatchId::new();
        let stats = self.stats.clone();
        let running = self.running.clone();

        stats.record_dispatch();
        debug!(dispatch_id = %id, task_name = %name, "dispatching task");

        tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => DispatchOutcome::Completed,
                Ok(Err(e)) => {
                    debug!(dispatch_id = %id, task_name = %name, error = %e, "task failed");
                    DispatchOutcome::Erroneous
                }
                Err(_) => {
                    warn!(dispatch_id = %id, task_name = %name, "task panicked");
                    DispatchOutcome::Erroneous
                }
            };
            stats.record(outcome);
            running.fetch_sub(1, Ordering::AcqRel);
        });

        Ok(id)
    }

    /// Wait until no task is running or the timeout passes.
    ///
    /// Returns `true` when everything finished in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.running_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    running = self.running_count(),
                    "drain timeout reached, tasks still running"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Refuse new work, then drain.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        info!("shutting down dispatcher");
        self.shutdown.store(true, Ordering::Release);
        self.drain(timeout).await
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
