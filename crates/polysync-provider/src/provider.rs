//! The provider capability contract and the name-keyed registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use polysync_core::{ApplicationInfo, IntegrationInfo, PolicyInfo};
use tracing::info;

use crate::error::{ProviderError, ProviderResult};

/// Which side's addressing survives when policy is copied into a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
    /// Keep the destination's resource ids; actions travel with the policy.
    #[default]
    Resource,
    /// Keep the destination's actions; used when actions are backend
    /// vocabulary such as group names.
    Action,
}

/// Adapter between one backend's native authorization model and the
/// canonical policy model.
///
/// A provider only acts on integrations whose name matches its own,
/// case-insensitively.
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// Backend discriminator.
    fn name(&self) -> &str;

    /// Retention applied when this provider is the copy destination.
    fn retention(&self) -> Retention {
        Retention::Resource
    }

    /// Check whether `integration` targets this provider.
    fn matches(&self, integration: &IntegrationInfo) -> bool {
        self.name().eq_ignore_ascii_case(integration.name.trim())
    }

    /// List synchronizable units. Empty when the integration targets another
    /// provider.
    async fn discover_applications(
        &self,
        integration: &IntegrationInfo,
    ) -> ProviderResult<Vec<ApplicationInfo>>;

    /// Read the application's current policy in canonical form.
    async fn get_policy_info(
        &self,
        integration: &IntegrationInfo,
        app: &ApplicationInfo,
    ) -> ProviderResult<Vec<PolicyInfo>>;

    /// Converge the application's policy toward `policies`, writing only
    /// what changed.
    async fn set_policy_info(
        &self,
        integration: &IntegrationInfo,
        app: &ApplicationInfo,
        policies: &[PolicyInfo],
    ) -> ProviderResult<StatusCode>;
}

/// Fail unless `integration` targets `provider`.
pub fn ensure_matches(provider: &dyn Provider, integration: &IntegrationInfo) -> ProviderResult<()> {
    if provider.matches(integration) {
        Ok(())
    } else {
        Err(ProviderError::config(format!(
            "integration {} does not target provider {}",
            integration.name,
            provider.name()
        )))
    }
}

/// Explicit name-to-provider lookup.
#[derive(Debug, Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> ProviderResult<()> {
        let key = normalize(provider.name());
        if self.providers.contains_key(&key) {
            return Err(ProviderError::DuplicateProvider(provider.name().to_string()));
        }
        info!(provider = provider.name(), "registered provider");
        self.providers.insert(key, provider);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, provider: Arc<dyn Provider>) -> ProviderResult<Self> {
        self.register(provider)?;
        Ok(self)
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> ProviderResult<Arc<dyn Provider>> {
        self.providers
            .get(&normalize(name))
            .cloned()
            .ok_or_else(|| ProviderError::unknown_provider(name))
    }

    /// Resolve the provider an integration targets.
    pub fn resolve(&self, integration: &IntegrationInfo) -> ProviderResult<Arc<dyn Provider>> {
        self.get(&integration.name)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.values().map(|p| p.name()).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}
