//! Dispatch identity, outcome and statistics types.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Unique identifier for one dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchId(Uuid);

impl DispatchId {
    /// Generate a new unique dispatch ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a dispatched task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The task returned `Ok`.
    Completed,
    /// The task returned an error or panicked.
    Erroneous,
    /// The task was refused at the in-flight cap and never ran.
    Rejected,
}

impl DispatchOutcome {
    /// Metric label for this outcome.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Erroneous => "erroneous",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch statistics.
#[derive(Debug, Default)]
pub struct DispatchStats {
    dispatched: AtomicU64,
    completed: AtomicU64,
    erroneous: AtomicU64,
    rejected: AtomicU64,
    running: AtomicU64,
}

impl DispatchStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task entering the running set.
    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.running.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how a task ended.
    pub fn record(&self, outcome: DispatchOutcome) {
        metrics::counter!("polysync_dispatch_total", "outcome" => outcome.as_str()).increment(1);
        match outcome {
            DispatchOutcome::Completed => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                self.running.fetch_sub(1, Ordering::Relaxed);
            }
            DispatchOutcome::Erroneous => {
                self.erroneous.fetch_add(1, Ordering::Relaxed);
                self.running.fetch_sub(1, Ordering::Relaxed);
            }
            DispatchOutcome::Rejected => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Total tasks that started running.
    pub fn total_dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Tasks completed successfully.
    pub fn total_completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Tasks that failed or panicked.
    pub fn total_erroneous(&self) -> u64 {
        self.erroneous.load(Ordering::Relaxed)
    }

    /// Tasks refused at the in-flight cap.
    pub fn total_rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Tasks currently running.
    pub fn currently_running(&self) -> u64 {
        self.running.load(Ordering::Relaxed)
    }

    /// Get success rate (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        let completed = self.total_completed();
        let total = completed + self.total_erroneous();
        if total == 0 {
            1.0
        } else {
            completed as f64 / total as f64
        }
    }
}
