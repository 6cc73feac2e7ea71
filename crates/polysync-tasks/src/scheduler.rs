//! Interval-driven discovery scheduler.
//!
//! Every registered [`Worker`] gets its own tick loop. On each tick the loop
//! asks the shared [`WorkFinder`] for pending tasks and dispatches every one
//! of them without waiting, so a slow task never delays the next tick.
//! Completion and failure are reported back to the finder; the scheduler
//! itself never retries.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dispatcher::{Dispatcher, DispatcherConfig, DEFAULT_MAX_IN_FLIGHT};
use crate::error::{TaskError, TaskResult};
use crate::task::DispatchStats;

/// Source of pending work and sink for its bookkeeping.
#[async_trait]
pub trait WorkFinder<T>: Send + Sync {
    /// Pending tasks for this tick.
    async fn find_requested(&self) -> TaskResult<Vec<T>>;

    /// Called after a worker finished `task` successfully.
    fn mark_completed(&self, task: &T);

    /// Called after a worker failed or panicked on `task`.
    fn mark_erroneous(&self, task: &T);

    /// Called once when the scheduler stops.
    async fn stop(&self) {}
}

/// Executes one task.
#[async_trait]
pub trait Worker<T>: Send + Sync {
    /// Name used in logs and dispatch records.
    fn name(&self) -> &str {
        "worker"
    }

    /// Run the task.
    async fn run(&self, task: &T) -> TaskResult<()>;
}

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between ticks; the first tick fires one delay after start.
    pub delay: Duration,
    /// Cap on concurrently running tasks across all workers.
    pub max_in_flight: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(60),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with the given tick interval.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Create a configuration from an interval in milliseconds.
    pub fn from_millis(delay_ms: u64) -> Self {
        Self::new(Duration::from_millis(delay_ms))
    }

    /// Set the in-flight cap.
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    fn validate(&self) -> TaskResult<()> {
        if self.delay.is_zero() {
            return Err(TaskError::invalid_config("delay must be greater than zero"));
        }
        if self.max_in_flight == 0 {
            return Err(TaskError::invalid_config(
                "max_in_flight must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Periodic dispatcher of finder-supplied work.
pub struct Scheduler<T> {
    config: SchedulerConfig,
    finder: Arc<dyn WorkFinder<T>>,
    workers: Vec<Arc<dyn Worker<T>>>,
    dispatcher: Dispatcher,
    running: AtomicBool,
    shutdown_tx: Mutex<Option<broadcast::Sender<()>>>,
    loop_handles: Mutex<Vec<JoinHandle<()>>>,
    ticks: Arc<AtomicU64>,
}

impl<T> std::fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("workers", &self.workers.len())
            .field("running", &self.running.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<T> Scheduler<T>
where
    T: Send + Sync + 'static,
{
    /// Create a scheduler ticking every `delay`.
    pub fn new(
        finder: Arc<dyn WorkFinder<T>>,
        workers: Vec<Arc<dyn Worker<T>>>,
        delay: Duration,
    ) -> Self {
        Self::with_config(finder, workers, SchedulerConfig::new(delay))
    }

    /// Create a scheduler with custom configuration.
    pub fn with_config(
        finder: Arc<dyn WorkFinder<T>>,
        workers: Vec<Arc<dyn Worker<T>>>,
        config: SchedulerConfig,
    ) -> Self {
        let dispatcher = Dispatcher::with_config(
            DispatcherConfig::new().with_max_in_flight(config.max_in_flight),
        );
        Self {
            config,
            finder,
            workers,
            dispatcher,
            running: AtomicBool::new(false),
            shutdown_tx: Mutex::new(None),
            loop_handles: Mutex::new(Vec::new()),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Check if the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Dispatch statistics across all workers.
    pub fn stats(&self) -> &DispatchStats {
        self.dispatcher.stats()
    }

    /// Number of worker ticks processed so far.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Start one tick loop per worker.
    pub fn start(&self) -> TaskResult<()> {
        self.config.validate()?;
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(TaskError::AlreadyRunning);
        }

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut handles = Vec::with_capacity(self.workers.len());

        for worker in &self.workers {
            let tick_loop = TickLoop {
                finder: self.finder.clone(),
                worker: worker.clone(),
                dispatcher: self.dispatcher.clone(),
                ticks: self.ticks.clone(),
                delay: self.config.delay,
            };
            handles.push(tokio::spawn(tick_loop.run(shutdown_tx.subscribe())));
        }

        *self.shutdown_tx.lock() = Some(shutdown_tx);
        self.loop_handles.lock().extend(handles);

        info!(
            workers = self.workers.len(),
            delay_ms = self.config.delay.as_millis() as u64,
            max_in_flight = self.config.max_in_flight,
            "scheduler started"
        );
        Ok(())
    }

    /// Stop every tick loop and notify the finder.
    ///
    /// Tasks already dispatched keep running; use [`drain`](Self::drain) to
    /// wait for them.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }

        let handles: Vec<_> = std::mem::take(&mut *self.loop_handles.lock());
        for handle in handles {
            let _ = handle.await;
        }

        self.finder.stop().await;
        info!(
            running = self.dispatcher.running_count(),
            "scheduler stopped"
        );
    }

    /// Wait for in-flight tasks, up to `timeout`.
    ///
    /// Returns `true` when nothing is left running.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.dispatcher.drain(timeout).await
    }
}

impl<T> Drop for Scheduler<T> {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

struct TickLoop<T> {
    finder: Arc<dyn WorkFinder<T>>,
    worker: Arc<dyn Worker<T>>,
    dispatcher: Dispatcher,
    ticks: Arc<AtomicU64>,
    delay: Duration,
}

impl<T> TickLoop<T>
where
    T: Send + Sync + 'static,
{
    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let start = tokio::time::Instant::now() + self.delay;
        let mut interval = tokio::time::interval_at(start, self.delay);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown_rx.recv() => {
                    debug!(worker = self.worker.name(), "tick loop received shutdown signal");
                    break;
                }
            }
        }
    }

    async fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);

        let tasks = match self.finder.find_requested().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(worker = self.worker.name(), error = %e, "failed to find requested work");
                return;
            }
        };
        debug!(worker = self.worker.name(), tasks = tasks.len(), "dispatching requested work");

        for task in tasks {
            let finder = self.finder.clone();
            let worker = self.worker.clone();

            let dispatched = self.dispatcher.dispatch(self.worker.name().to_string(), async move {
                match AssertUnwindSafe(worker.run(&task)).catch_unwind().await {
                    Ok(Ok(())) => {
                        finder.mark_completed(&task);
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        finder.mark_erroneous(&task);
                        Err(e)
                    }
                    Err(_) => {
                        finder.mark_erroneous(&task);
                        Err(TaskError::panicked(format!("worker {} panicked", worker.name())))
                    }
                }
            });

            if let Err(e) = dispatched {
                warn!(worker = self.worker.name(), error = %e, "task skipped for this tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingFinder {
        finds: AtomicUsize,
        completed: AtomicUsize,
        erroneous: AtomicUsize,
        stopped: AtomicBool,
    }

    #[async_trait]
    impl WorkFinder<u32> for CountingFinder {
        async fn find_requested(&self) -> TaskResult<Vec<u32>> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1, 2, 3])
        }

        fn mark_completed(&self, _task: &u32) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn mark_erroneous(&self, _task: &u32) {
            self.erroneous.fetch_add(1, Ordering::SeqCst);
        }

        async fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct OkWorker;

    #[async_trait]
    impl Worker<u32> for OkWorker {
        async fn run(&self, _task: &u32) -> TaskResult<()> {
            Ok(())
        }
    }

    struct FailingWorker;

    #[async_trait]
    impl Worker<u32> for FailingWorker {
        fn name(&self) -> &str {
            "failing"
        }

        async fn run(&self, task: &u32) -> TaskResult<()> {
            Err(TaskError::worker(format!("task {task} failed")))
        }
    }

    struct PanickingWorker;

    #[async_trait]
    impl Worker<u32> for PanickingWorker {
        async fn run(&self, task: &u32) -> TaskResult<()> {
            assert!(*task > 100, "unexpected task {task}");
            Ok(())
        }
    }

    fn ok() -> Arc<dyn Worker<u32>> {
        Arc::new(OkWorker)
    }

    fn failing() -> Arc<dyn Worker<u32>> {
        Arc::new(FailingWorker)
    }

    fn scheduler_every(
        finder: &Arc<CountingFinder>,
        workers: Vec<Arc<dyn Worker<u32>>>,
        delay: Duration,
    ) -> Scheduler<u32> {
        let finder: Arc<dyn WorkFinder<u32>> = finder.clone();
        Scheduler::new(finder, workers, delay)
    }

    fn scheduler(
        finder: &Arc<CountingFinder>,
        workers: Vec<Arc<dyn Worker<u32>>>,
    ) -> Scheduler<u32> {
        scheduler_every(finder, workers, Duration::from_millis(10))
    }

    #[test]
    fn test_config() {
        let config = SchedulerConfig::from_millis(250).with_max_in_flight(4);
        assert_eq!(config.delay, Duration::from_millis(250));
        assert_eq!(config.max_in_flight, 4);
        assert!(config.validate().is_ok());
        assert!(SchedulerConfig::from_millis(0).validate().is_err());
        assert!(SchedulerConfig::default()
            .with_max_in_flight(0)
            .validate()
            .is_err());
    }

    #[tokio::test]
    async fn test_every_found_task_is_marked_completed() {
        let finder = Arc::new(CountingFinder::default());
        let scheduler = scheduler(&finder, vec![ok()]);

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(55)).await;
        scheduler.stop().await;
        assert!(scheduler.drain(Duration::from_secs(1)).await);

        let finds = finder.finds.load(Ordering::SeqCst);
        assert!(finds >= 1);
        assert_eq!(finder.completed.load(Ordering::SeqCst), 3 * finds);
        assert_eq!(finder.erroneous.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.stats().total_completed(), (3 * finds) as u64);
        assert!(finder.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failing_worker_marks_erroneous() {
        let finder = Arc::new(CountingFinder::default());
        let scheduler = scheduler(&finder, vec![failing()]);

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;
        scheduler.stop().await;
        assert!(scheduler.drain(Duration::from_secs(1)).await);

        let finds = finder.finds.load(Ordering::SeqCst);
        assert!(finds >= 1);
        assert_eq!(finder.erroneous.load(Ordering::SeqCst), 3 * finds);
        assert_eq!(finder.completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_worker_is_contained() {
        let finder = Arc::new(CountingFinder::default());
        let scheduler = scheduler(&finder, vec![Arc::new(PanickingWorker) as Arc<dyn Worker<u32>>]);

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;
        scheduler.stop().await;
        assert!(scheduler.drain(Duration::from_secs(1)).await);

        let finds = finder.finds.load(Ordering::SeqCst);
        assert_eq!(finder.erroneous.load(Ordering::SeqCst), 3 * finds);
        assert_eq!(scheduler.stats().total_erroneous(), (3 * finds) as u64);
    }

    #[tokio::test]
    async fn test_stop_reaches_every_worker_loop() {
        let finder = Arc::new(CountingFinder::default());
        let scheduler = scheduler(
            &finder,
            vec![ok(), ok(), failing()],
        );

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());

        let finds_at_stop = finder.finds.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(finder.finds.load(Ordering::SeqCst), finds_at_stop);
    }

    #[tokio::test]
    async fn test_first_tick_waits_for_delay() {
        let finder = Arc::new(CountingFinder::default());
        let scheduler = scheduler_every(&finder, vec![ok()], Duration::from_secs(60));

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(finder.finds.load(Ordering::SeqCst), 0);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let finder = Arc::new(CountingFinder::default());
        let scheduler = scheduler(&finder, vec![ok()]);

        scheduler.start().unwrap();
        assert!(matches!(scheduler.start(), Err(TaskError::AlreadyRunning)));
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let finder = Arc::new(CountingFinder::default());
        let scheduler = scheduler(&finder, vec![ok()]);

        scheduler.stop().await;
        assert!(!finder.stopped.load(Ordering::SeqCst));
    }
}
