//! # Polysync Tasks
//!
//! Periodic discovery scheduling and best-effort concurrent fan-out.
//!
//! 1. **Scheduler**: ticks on a fixed interval, one loop per [`Worker`],
//!    dispatching every task a [`WorkFinder`] reports as pending.
//! 2. **Dispatcher**: fire-and-forget spawning with an in-flight cap.
//! 3. **Fan-out**: applies an async lookup to many items concurrently and
//!    keeps whatever succeeded.
//!
//! ## Scheduler
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use polysync_tasks::{Scheduler, TaskResult, WorkFinder, Worker};
//!
//! struct Integrations;
//!
//! #[async_trait]
//! impl WorkFinder<String> for Integrations {
//!     async fn find_requested(&self) -> TaskResult<Vec<String>> {
//!         Ok(vec!["opa-dev".to_string()])
//!     }
//!     fn mark_completed(&self, _task: &String) {}
//!     fn mark_erroneous(&self, _task: &String) {}
//! }
//!
//! struct Discover;
//!
//! #[async_trait]
//! impl Worker<String> for Discover {
//!     async fn run(&self, integration: &String) -> TaskResult<()> {
//!         println!("discovering {integration}");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let scheduler = Scheduler::<String>::new(
//!         Arc::new(Integrations),
//!         vec![Arc::new(Discover) as Arc<dyn Worker<String>>],
//!         Duration::from_secs(60),
//!     );
//!     scheduler.start().unwrap();
//!
//!     // ... run your application ...
//!
//!     scheduler.stop().await;
//!     scheduler.drain(Duration::from_secs(30)).await;
//! }
//! ```
//!
//! ## Fan-out
//!
//! ```rust
//! use polysync_tasks::process_async;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let resolved = process_async(vec!["alice", "nobody"], |id| async move {
//!     if id == "nobody" {
//!         Err("not found")
//!     } else {
//!         Ok(format!("user:{id}@example.com"))
//!     }
//! })
//! .await;
//! assert_eq!(resolved, vec!["user:alice@example.com".to_string()]);
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod dispatcher;
mod error;
mod fanout;
mod scheduler;
mod task;

pub use dispatcher::{Dispatcher, DispatcherConfig, DEFAULT_MAX_IN_FLIGHT};
pub use error::{BoxError, TaskError, TaskResult};
pub use fanout::{process_async, FanOut};
pub use scheduler::{Scheduler, SchedulerConfig, WorkFinder, Worker};
pub use task::{DispatchId, DispatchOutcome, DispatchStats};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::dispatcher::{Dispatcher, DispatcherConfig};
    pub use crate::error::{TaskError, TaskResult};
    pub use crate::fanout::{process_async, FanOut};
    pub use crate::scheduler::{Scheduler, SchedulerConfig, WorkFinder, Worker};
    pub use crate::task::{DispatchOutcome, DispatchStats};
}
