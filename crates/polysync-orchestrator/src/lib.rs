//! # Polysync Orchestrator
//!
//! Moves policy between applications that live behind different providers,
//! and keeps the application catalog current.
//!
//! - [`Synchronizer`] copies one application's policy onto another,
//!   re-addressing it with the [`Retention`](polysync_provider::Retention)
//!   rule the destination provider asks for.
//! - [`DiscoveryWorkFinder`] and [`DiscoveryWorker`] plug into a
//!   [`Scheduler`](polysync_tasks::Scheduler) to discover applications
//!   behind every integration on a fixed cadence.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use polysync_core::{ApplicationInfo, IntegrationInfo};
//! use polysync_orchestrator::{InMemoryCatalog, Synchronizer};
//! use polysync_provider::{NoopProvider, ProviderRegistry, StatusCode};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let catalog = InMemoryCatalog::new();
//! catalog.add_integration("noop-1", IntegrationInfo::new("noop", "{}"));
//! let from = catalog.add_application("noop-1", ApplicationInfo::new("a", "A"));
//! let to = catalog.add_application("noop-1", ApplicationInfo::new("b", "B"));
//!
//! let registry = ProviderRegistry::new()
//!     .with(Arc::new(NoopProvider::new()))
//!     .unwrap();
//! let sync = Synchronizer::new(Arc::new(catalog), Arc::new(registry));
//!
//! let status = sync.apply(&from.id, &to.id).await.unwrap();
//! assert_eq!(status, StatusCode::CREATED);
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod discovery;
pub mod error;
pub mod retention;
pub mod sync;

pub use catalog::{ApplicationCatalog, ApplicationRecord, InMemoryCatalog, IntegrationRecord};
pub use discovery::{DiscoveryWorkFinder, DiscoveryWorker};
pub use error::{SyncError, SyncResult};
pub use retention::{retain, retain_action, retain_resource};
pub use sync::Synchronizer;
