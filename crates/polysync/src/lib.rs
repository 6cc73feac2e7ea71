//! # Polysync
//!
//! Policy distribution and synchronization across heterogeneous
//! authorization backends.
//!
//! Polysync reads access policy from one backend (an API gateway, an OPA
//! bundle server, a cloud IAM directory), normalizes it into a canonical
//! policy model, and writes the minimal set of changes to another.
//!
//! | Crate | Role |
//! |-------|------|
//! | [`core`] | Policy model, compaction, grant-point diffing |
//! | [`provider`] | Provider contract and the bundled adapters |
//! | [`tasks`] | Discovery scheduler and concurrent fan-out |
//! | [`orchestrator`] | Synchronization service and discovery workers |
//! | [`config`] | Layered agent configuration |
//! | [`telemetry`] | Logging and Prometheus metrics |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use polysync::config::ConfigLoader;
//! use polysync::Agent;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().with_file("polysync.toml")?.load()?;
//! let agent = Agent::new(config)?;
//! agent.start()?;
//!
//! tokio::signal::ctrl_c().await?;
//! agent.shutdown(Duration::from_secs(30)).await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod agent;
mod error;

pub use agent::{default_registry, Agent};
pub use error::{AgentError, AgentResult};

// Re-export the member crates
pub use polysync_config as config;
pub use polysync_core as core;
pub use polysync_orchestrator as orchestrator;
pub use polysync_provider as provider;
pub use polysync_tasks as tasks;
pub use polysync_telemetry as telemetry;

/// Version of the Polysync crates.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
///
/// ```rust
/// use polysync::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Agent, AgentError, AgentResult};

    pub use polysync_core::{ApplicationInfo, IntegrationInfo, PolicyInfo, ResourceActionRoles};
    pub use polysync_orchestrator::{
        ApplicationCatalog, InMemoryCatalog, SyncError, SyncResult, Synchronizer,
    };
    pub use polysync_provider::{
        Provider, ProviderError, ProviderRegistry, ProviderResult, Retention, StatusCode,
    };
    pub use polysync_tasks::{FanOut, Scheduler, SchedulerConfig, WorkFinder, Worker};
}
