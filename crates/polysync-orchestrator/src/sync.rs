//! Copying policy from one application to another.

use std::sync::Arc;

use http::StatusCode;
use polysync_provider::{Provider, ProviderRegistry};
use tracing::{debug, info, instrument, warn};

use crate::catalog::{ApplicationCatalog, ApplicationRecord, IntegrationRecord};
use crate::error::{SyncError, SyncResult};
use crate::retention::retain;

/// One side of a synchronization, fully resolved.
struct Endpoint {
    app: ApplicationRecord,
    integration: IntegrationRecord,
    provider: Arc<dyn Provider>,
}

/// The synchronization service.
///
/// Reads the source application's policy, re-addresses it for the
/// destination and lets the destination provider converge toward it.
/// Nothing is rolled back on failure; repeating a call after fixing the
/// cause converges.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    catalog: Arc<dyn ApplicationCatalog>,
    registry: Arc<ProviderRegistry>,
}

impl Synchronizer {
    /// Create a synchronizer over a catalog and a provider registry.
    pub fn new(catalog: Arc<dyn ApplicationCatalog>, registry: Arc<ProviderRegistry>) -> Self {
        Self { catalog, registry }
    }

    /// Copy policy from application `from` to application `to`.
    ///
    /// Returns the destination provider's status on success.
    #[instrument(skip(self))]
    pub async fn apply(&self, from: &str, to: &str) -> SyncResult<StatusCode> {
        let result = self.try_apply(from, to).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!("polysync_sync_total", "outcome" => outcome).increment(1);

        if let Err(e) = &result {
            warn!(error = %e, "synchronization failed");
        }
        result
    }

    async fn try_apply(&self, from: &str, to: &str) -> SyncResult<StatusCode> {
        if from.trim().is_empty() {
            return Err(SyncError::MissingApplicationId("from"));
        }
        if to.trim().is_empty() {
            return Err(SyncError::MissingApplicationId("to"));
        }

        let source = self.resolve(from).await?;
        let dest = self.resolve(to).await?;
        debug!(
            from_provider = source.provider.name(),
            to_provider = dest.provider.name(),
            "resolved endpoints"
        );

        let from_policies = source
            .provider
            .get_policy_info(&source.integration.info, &source.app.info)
            .await?;
        let to_policies = dest
            .provider
            .get_policy_info(&dest.integration.info, &dest.app.info)
            .await?;

        let retention = dest.provider.retention();
        let desired = retain(retention, &from_policies, &to_policies)?;
        debug!(
            ?retention,
            from_policies = from_policies.len(),
            to_policies = to_policies.len(),
            "policy re-addressed for destination"
        );

        let status = dest
            .provider
            .set_policy_info(&dest.integration.info, &dest.app.info, &desired)
            .await?;
        if !status.is_success() {
            return Err(SyncError::UnexpectedStatus {
                provider: dest.provider.name().to_string(),
                status,
            });
        }

        info!(
            from_provider = source.provider.name(),
            to_provider = dest.provider.name(),
            policies = desired.len(),
            status = status.as_u16(),
            "policy synchronized"
        );
        Ok(status)
    }

    async fn resolve(&self, app_id: &str) -> SyncResult<Endpoint> {
        let app = self.catalog.find_application(app_id).await?;
        let integration = self.catalog.find_integration(&app.integration_id).await?;
        let provider = self.registry.resolve(&integration.info)?;
        Ok(Endpoint {
            app,
            integration,
            provider,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use polysync_core::{ApplicationInfo, IntegrationInfo, PolicyInfo};
    use polysync_provider::{NoopProvider, ProviderResult};

    use crate::catalog::InMemoryCatalog;

    #[derive(Debug)]
    struct RejectingProvider;

    #[async_trait]
    impl Provider for RejectingProvider {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn discover_applications(
            &self,
            _integration: &IntegrationInfo,
        ) -> ProviderResult<Vec<ApplicationInfo>> {
            Ok(Vec::new())
        }

        async fn get_policy_info(
            &self,
            _integration: &IntegrationInfo,
            _app: &ApplicationInfo,
        ) -> ProviderResult<Vec<PolicyInfo>> {
            Ok(vec![PolicyInfo::new(["http:GET"], ["x"], "/r")])
        }

        async fn set_policy_info(
            &self,
            _integration: &IntegrationInfo,
            _app: &ApplicationInfo,
            _policies: &[PolicyInfo],
        ) -> ProviderResult<StatusCode> {
            Ok(StatusCode::CONFLICT)
        }
    }

    struct Fixture {
        sync: Synchronizer,
        noop: Arc<NoopProvider>,
        from: String,
        to: String,
        rejecting: String,
    }

    fn fixture() -> Fixture {
        let catalog = InMemoryCatalog::new();
        catalog.add_integration("noop-1", IntegrationInfo::new("noop", "{}"));
        catalog.add_integration("rej-1", IntegrationInfo::new("rejecting", "{}"));
        let from = catalog.add_application("noop-1", ApplicationInfo::new("a", "A")).id;
        let to = catalog.add_application("noop-1", ApplicationInfo::new("b", "B")).id;
        let rejecting = catalog
            .add_application("rej-1", ApplicationInfo::new("c", "C"))
            .id;

        let noop = Arc::new(NoopProvider::new());
        let mut registry = ProviderRegistry::new();
        registry.register(noop.clone()).unwrap();
        registry.register(Arc::new(RejectingProvider)).unwrap();

        Fixture {
            sync: Synchronizer::new(Arc::new(catalog), Arc::new(registry)),
            noop,
            from,
            to,
            rejecting,
        }
    }

    #[tokio::test]
    async fn test_empty_ids_are_rejected() {
        let f = fixture();
        assert!(matches!(
            f.sync.apply("", &f.to).await,
            Err(SyncError::MissingApplicationId("from"))
        ));
        assert!(matches!(
            f.sync.apply(&f.from, "  ").await,
            Err(SyncError::MissingApplicationId("to"))
        ));
    }

    #[tokio::test]
    async fn test_unknown_application() {
        let f = fixture();
        let err = f.sync.apply(&f.from, "missing").await.unwrap_err();
        assert!(matches!(err, SyncError::ApplicationNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_apply_between_noop_applications() {
        let f = fixture();
        let status = f.sync.apply(&f.from, &f.to).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let written = f.noop.written("b").unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(
            written[0].subject.members,
            vec!["allusers", "allauthenticated"]
        );
    }

    #[tokio::test]
    async fn test_failure_status_is_an_error() {
        let f = fixture();
        let err = f.sync.apply(&f.from, &f.rejecting).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::UnexpectedStatus { status: StatusCode::CONFLICT, .. }
        ));
    }
}
