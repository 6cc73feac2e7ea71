//! A provider that talks to no backend.
//!
//! Used as a test double and as a placeholder integration in the agent.

use std::collections::HashMap;

use async_trait::async_trait;
use http::StatusCode;
use parking_lot::Mutex;
use polysync_core::{ApplicationInfo, IntegrationInfo, PolicyInfo};
use tracing::{debug, instrument};

use crate::error::ProviderResult;
use crate::provider::{ensure_matches, Provider};

/// Default name of the noop provider.
pub const NOOP_PROVIDER_NAME: &str = "noop";

/// In-memory stand-in for a real backend.
///
/// Discovers a single application, serves canned policy until something is
/// written, and accepts every write with `201 Created`.
#[derive(Debug)]
pub struct NoopProvider {
    name: String,
    canned: Vec<PolicyInfo>,
    written: Mutex<HashMap<String, Vec<PolicyInfo>>>,
}

impl NoopProvider {
    /// Create a provider named `noop`.
    pub fn new() -> Self {
        Self::named(NOOP_PROVIDER_NAME)
    }

    /// Create a provider answering to a different name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            canned: vec![PolicyInfo::new(
                ["http:GET:/"],
                ["allusers", "allauthenticated"],
                "aResourceId",
            )],
            written: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the canned policy served before any write.
    pub fn with_policies(mut self, policies: Vec<PolicyInfo>) -> Self {
        self.canned = policies;
        self
    }

    /// The policies last written for an application, if any.
    pub fn written(&self, object_id: &str) -> Option<Vec<PolicyInfo>> {
        self.written.lock().get(object_id).cloned()
    }
}

impl Default for NoopProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for NoopProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover_applications(
        &self,
        integration: &IntegrationInfo,
    ) -> ProviderResult<Vec<ApplicationInfo>> {
        if !self.matches(integration) {
            return Ok(Vec::new());
        }
        Ok(vec![ApplicationInfo::new(
            format!("{}-app", self.name),
            format!("{} application", self.name),
        )
        .with_description("discovered by the noop provider")
        .with_service(self.name.clone())])
    }

    async fn get_policy_info(
        &self,
        integration: &IntegrationInfo,
        app: &ApplicationInfo,
    ) -> ProviderResult<Vec<PolicyInfo>> {
        ensure_matches(self, integration)?;
        Ok(self
            .written(&app.object_id)
            .unwrap_or_else(|| self.canned.clone()))
    }

    #[instrument(skip_all, fields(provider = %self.name, app = %app.object_id))]
    async fn set_policy_info(
        &self,
        integration: &IntegrationInfo,
        app: &ApplicationInfo,
        policies: &[PolicyInfo],
    ) -> ProviderResult<StatusCode> {
        ensure_matches(self, integration)?;
        debug!(policies = policies.len(), "accepting write");
        self.written
            .lock()
            .insert(app.object_id.clone(), policies.to_vec());
        Ok(StatusCode::CREATED)
    }
}
