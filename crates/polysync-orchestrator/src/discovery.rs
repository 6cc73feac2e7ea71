//! Periodic discovery of applications behind every integration.
//!
//! [`DiscoveryWorkFinder`] hands the scheduler one task per known
//! integration each tick; [`DiscoveryWorker`] asks the integration's
//! provider which applications exist and records the new ones. Running
//! discovery repeatedly never duplicates an application.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use polysync_provider::ProviderRegistry;
use polysync_tasks::{TaskError, TaskResult, WorkFinder, Worker};
use tracing::{debug, info, instrument, warn};

use crate::catalog::{ApplicationCatalog, IntegrationRecord};

/// Finds integrations due for discovery.
#[derive(Debug)]
pub struct DiscoveryWorkFinder {
    catalog: Arc<dyn ApplicationCatalog>,
    completed: AtomicU64,
    erroneous: AtomicU64,
    stopped: AtomicBool,
}

impl DiscoveryWorkFinder {
    /// Create a finder over a catalog.
    pub fn new(catalog: Arc<dyn ApplicationCatalog>) -> Self {
        Self {
            catalog,
            completed: AtomicU64::new(0),
            erroneous: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    /// Number of discovery runs that finished successfully.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Number of discovery runs that failed.
    pub fn erroneous(&self) -> u64 {
        self.erroneous.load(Ordering::Relaxed)
    }

    /// Check if the scheduler has stopped this finder.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

#[async_trait]
impl WorkFinder<IntegrationRecord> for DiscoveryWorkFinder {
    async fn find_requested(&self) -> TaskResult<Vec<IntegrationRecord>> {
        if self.is_stopped() {
            return Ok(Vec::new());
        }
        self.catalog
            .list_integrations()
            .await
            .map_err(TaskError::worker)
    }

    fn mark_completed(&self, task: &IntegrationRecord) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        debug!(integration = %task.id, "discovery completed");
    }

    fn mark_erroneous(&self, task: &IntegrationRecord) {
        self.erroneous.fetch_add(1, Ordering::Relaxed);
        warn!(integration = %task.id, "discovery failed");
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        info!(
            completed = self.completed(),
            erroneous = self.erroneous(),
            "discovery finder stopped"
        );
    }
}

/// Discovers the applications of one integration.
#[derive(Debug, Clone)]
pub struct DiscoveryWorker {
    catalog: Arc<dyn ApplicationCatalog>,
    registry: Arc<ProviderRegistry>,
}

impl DiscoveryWorker {
    /// Create a worker recording into `catalog`.
    pub fn new(catalog: Arc<dyn ApplicationCatalog>, registry: Arc<ProviderRegistry>) -> Self {
        Self { catalog, registry }
    }
}

#[async_trait]
impl Worker<IntegrationRecord> for DiscoveryWorker {
    fn name(&self) -> &str {
        "discovery"
    }

    #[instrument(skip_all, fields(integration = %task.id, provider = %task.info.name))]
    async fn run(&self, task: &IntegrationRecord) -> TaskResult<()> {
        let provider = self.registry.resolve(&task.info).map_err(TaskError::worker)?;
        let apps = provider
            .discover_applications(&task.info)
            .await
            .map_err(TaskError::worker)?;

        let found = apps.len();
        let mut created = 0_u64;
        for app in apps {
            let (record, is_new) = self
                .catalog
                .create_if_absent(&task.id, app)
                .await
                .map_err(TaskError::worker)?;
            if is_new {
                created += 1;
                debug!(app = %record.info.object_id, id = %record.id, "new application");
            }
        }

        if created > 0 {
            metrics::counter!("polysync_discovered_applications_total").increment(created);
        }
        debug!(found, created, "discovery pass finished");
        Ok(())
    }
}
