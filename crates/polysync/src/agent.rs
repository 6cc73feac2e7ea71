//! The long-running discovery agent.

use std::sync::Arc;
use std::time::Duration;

use polysync_config::PolysyncConfig;
use polysync_orchestrator::{
    DiscoveryWorkFinder, DiscoveryWorker, InMemoryCatalog, IntegrationRecord, Synchronizer,
};
use polysync_provider::{BundleProvider, NoopProvider, ProviderRegistry};
use polysync_tasks::{FanOut, Scheduler, SchedulerConfig, WorkFinder, Worker};
use tracing::{info, warn};

use crate::error::AgentResult;

/// Registry with the providers that need no external credentials to build:
/// the noop provider and the OPA bundle provider.
pub fn default_registry() -> AgentResult<ProviderRegistry> {
    Ok(ProviderRegistry::new()
        .with(Arc::new(NoopProvider::new()))?
        .with(Arc::new(BundleProvider::new()))?)
}

/// Wires configuration, catalog, providers and the discovery scheduler.
#[derive(Debug)]
pub struct Agent {
    config: PolysyncConfig,
    catalog: Arc<InMemoryCatalog>,
    registry: Arc<ProviderRegistry>,
    finder: Arc<DiscoveryWorkFinder>,
    scheduler: Scheduler<IntegrationRecord>,
}

impl Agent {
    /// Build an agent with the [`default_registry`].
    pub fn new(config: PolysyncConfig) -> AgentResult<Self> {
        Ok(Self::with_registry(config, default_registry()?))
    }

    /// Build an agent over a caller-assembled registry.
    ///
    /// Every configured integration is seeded into the catalog. Integrations
    /// whose provider is not registered are kept; their discovery fails
    /// each tick until a provider is registered.
    pub fn with_registry(config: PolysyncConfig, registry: ProviderRegistry) -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        for integration in &config.integrations {
            let info = integration.to_info();
            if let Err(e) = registry.resolve(&info) {
                warn!(integration = %integration.id, error = %e, "integration has no provider");
            }
            catalog.add_integration(integration.id.clone(), info);
        }

        let registry = Arc::new(registry);
        let finder = Arc::new(DiscoveryWorkFinder::new(catalog.clone()));
        let dyn_finder: Arc<dyn WorkFinder<IntegrationRecord>> = finder.clone();
        let worker: Arc<dyn Worker<IntegrationRecord>> =
            Arc::new(DiscoveryWorker::new(catalog.clone(), registry.clone()));
        let scheduler = Scheduler::with_config(
            dyn_finder,
            vec![worker],
            SchedulerConfig::new(config.scheduler.delay())
                .with_max_in_flight(config.scheduler.max_in_flight),
        );

        Self {
            config,
            catalog,
            registry,
            finder,
            scheduler,
        }
    }

    /// The loaded configuration.
    pub fn config(&self) -> &PolysyncConfig {
        &self.config
    }

    /// The application catalog discovery fills.
    pub fn catalog(&self) -> &Arc<InMemoryCatalog> {
        &self.catalog
    }

    /// The provider registry.
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Discovery outcome counters.
    pub fn finder(&self) -> &DiscoveryWorkFinder {
        &self.finder
    }

    /// Fan-out bound for providers that resolve many items per call.
    pub fn fan_out(&self) -> FanOut {
        FanOut::with_max_in_flight(self.config.fanout.max_in_flight)
    }

    /// A synchronizer sharing this agent's catalog and registry.
    pub fn synchronizer(&self) -> Synchronizer {
        Synchronizer::new(self.catalog.clone(), self.registry.clone())
    }

    /// Start periodic discovery.
    pub fn start(&self) -> AgentResult<()> {
        self.scheduler.start()?;
        info!(
            integrations = self.config.integrations.len(),
            providers = ?self.registry.names(),
            delay_ms = self.config.scheduler.delay_ms,
            "agent started"
        );
        Ok(())
    }

    /// Stop discovery and wait up to `timeout` for in-flight work.
    ///
    /// Returns `false` if work was still running when the timeout expired.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.scheduler.stop().await;
        let drained = self.scheduler.drain(timeout).await;
        let stats = self.scheduler.stats();
        info!(
            completed = self.finder.completed(),
            erroneous = self.finder.erroneous(),
            dispatched = stats.total_dispatched(),
            drained,
            "agent stopped"
        );
        drained
    }
}
