//! API-gateway style provider persisting grant points as named values.
//!
//! Each grant point is one named value whose name is the encoded
//! [`RarKey`](polysync_core::RarKey) and whose value is a JSON array of
//! roles:
//!
//! ```text
//! resrol-httpget-humanresources-us = ["role1","role2"]
//! ```
//!
//! Named values that do not carry the `resrol-` prefix belong to someone
//! else and are never touched.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use http::StatusCode;
use parking_lot::RwLock;
use polysync_core::{
    plan_updates, ApplicationInfo, IntegrationInfo, PolicyInfo, ResourceActionRoles,
    RAR_KEY_PREFIX,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{ensure_matches, Provider};

/// One stored name/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedValue {
    /// Value name.
    pub name: String,
    /// Raw value.
    pub value: String,
}

impl NamedValue {
    /// Create a named value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Backend storage for named values, scoped per application.
#[async_trait]
pub trait NamedValueStore: Send + Sync + fmt::Debug {
    /// Applications (gateway services) visible to this store.
    async fn list_applications(&self) -> ProviderResult<Vec<ApplicationInfo>>;

    /// All named values of an application.
    async fn list(&self, app_id: &str) -> ProviderResult<Vec<NamedValue>>;

    /// Create or replace one named value.
    async fn put(&self, app_id: &str, value: NamedValue) -> ProviderResult<()>;
}

/// Provider backed by a [`NamedValueStore`].
#[derive(Debug)]
pub struct NamedValueProvider<S> {
    name: String,
    store: S,
}

impl<S: NamedValueStore> NamedValueProvider<S> {
    /// Create a provider answering to `name`.
    pub fn new(name: impl Into<String>, store: S) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    async fn existing_rars(&self, app_id: &str) -> ProviderResult<Vec<ResourceActionRoles>> {
        let values = self.store.list(app_id).await?;
        Ok(values
            .iter()
            .filter(|nv| nv.name.starts_with(RAR_KEY_PREFIX))
            .filter_map(decode_rar)
            .collect())
    }
}

fn decode_rar(nv: &NamedValue) -> Option<ResourceActionRoles> {
    let roles: Vec<String> = match serde_json::from_str(&nv.value) {
        Ok(roles) => roles,
        Err(e) => {
            warn!(name = %nv.name, error = %e, "named value is not a role list, skipping");
            return None;
        }
    };
    match ResourceActionRoles::from_key(&nv.name, &roles) {
        Ok(rar) => Some(rar),
        Err(e) => {
            warn!(name = %nv.name, error = %e, "skipping named value");
            None
        }
    }
}

#[async_trait]
impl<S: NamedValueStore> Provider for NamedValueProvider<S> {
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
        self.store.list_applications().await
    }

    #[instrument(skip_all, fields(provider = %self.name, app = %app.object_id))]
    async fn get_policy_info(
        &self,
        integration: &IntegrationInfo,
        app: &ApplicationInfo,
    ) -> ProviderResult<Vec<PolicyInfo>> {
        ensure_matches(self, integration)?;
        let rars = self.existing_rars(&app.object_id).await?;
        debug!(grant_points = rars.len(), "read named values");
        Ok(rars.iter().map(ResourceActionRoles::to_policy).collect())
    }

    #[instrument(skip_all, fields(provider = %self.name, app = %app.object_id))]
    async fn set_policy_info(
        &self,
        integration: &IntegrationInfo,
        app: &ApplicationInfo,
        policies: &[PolicyInfo],
    ) -> ProviderResult<StatusCode> {
        ensure_matches(self, integration)?;

        let existing = self.existing_rars(&app.object_id).await?;
        let plan = plan_updates(&existing, policies);
        for key in &plan.ignored {
            warn!(key = %key, "grant point not provisioned, ignoring desired policy");
        }

        for rar in &plan.updates {
            let value = serde_json::to_string(&rar.roles)?;
            self.store
                .put(&app.object_id, NamedValue::new(rar.key().as_str(), value))
                .await?;
            metrics::counter!("polysync_rar_updates_total").increment(1);
        }

        info!(
            updated = plan.updates.len(),
            unchanged = plan.unchanged,
            ignored = plan.ignored.len(),
            "named values reconciled"
        );
        Ok(StatusCode::OK)
    }
}

/// Process-local [`NamedValueStore`].
#[derive(Debug, Default)]
pub struct InMemoryNamedValueStore {
    applications: RwLock<Vec<ApplicationInfo>>,
    values: RwLock<HashMap<String, BTreeMap<String, String>>>,
    failing: RwLock<HashSet<String>>,
}

impl InMemoryNamedValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an application discoverable.
    pub fn add_application(&self, app: ApplicationInfo) {
        self.applications.write().push(app);
    }

    /// Seed one named value.
    pub fn insert(&self, app_id: &str, name: impl Into<String>, value: impl Into<String>) {
        self.values
            .write()
            .entry(app_id.to_string())
            .or_default()
            .insert(name.into(), value.into());
    }

    /// Read one named value.
    pub fn value(&self, app_id: &str, name: &str) -> Option<String> {
        self.values.read().get(app_id)?.get(name).cloned()
    }

    /// Make writes to `name` fail, simulating a backend error.
    pub fn fail_writes_to(&self, name: impl Into<String>) {
        self.failing.write().insert(name.into());
    }
}

#[async_trait]
impl NamedValueStore for InMemoryNamedValueStore {
    async fn list_applications(&self) -> ProviderResult<Vec<ApplicationInfo>> {
        Ok(self.applications.read().clone())
    }

    async fn list(&self, app_id: &str) -> ProviderResult<Vec<NamedValue>> {
        Ok(self
            .values
            .read()
            .get(app_id)
            .map(|values| {
                values
                    .iter()
                    .map(|(name, value)| NamedValue::new(name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put(&self, app_id: &str, value: NamedValue) -> ProviderResult<()> {
        if self.failing.read().contains(&value.name) {
            return Err(ProviderError::backend(format!(
                "write to {} rejected",
                value.name
            )));
        }
        self.insert(app_id, value.name, value.value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = "payroll-api";

    fn integration() -> IntegrationInfo {
        IntegrationInfo::new("azure_apim", r#"{"subscription":"s1"}"#)
    }

    fn app() -> ApplicationInfo {
        ApplicationInfo::new(APP, "Payroll API")
    }

    fn provider() -> NamedValueProvider<InMemoryNamedValueStore> {
        let store = InMemoryNamedValueStore::new();
        store.add_application(app());
        store.insert(APP, "resrol-httpget-humanresources-us", r#"["role1","role2"]"#);
        store.insert(APP, "resrol-httpget-profile", r#"["role2","role1"]"#);
        store.insert(APP, "backend-url", "https://payroll.internal");
        NamedValueProvider::new("azure_apim", store)
    }

    #[tokio::test]
    async fn test_discover() {
        let provider = provider();
        let apps = provider.discover_applications(&integration()).await.unwrap();
        assert_eq!(apps, vec![app()]);

        let other = IntegrationInfo::new("aws", "{}");
        assert!(provider.discover_applications(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_policy_info_skips_foreign_values() {
        let provider = provider();
        provider.store().insert(APP, "resrol-httpget-broken", "not json");

        let policies = provider.get_policy_info(&integration(), &app()).await.unwrap();
        assert_eq!(policies.len(), 2);

        let hr = policies
            .iter()
            .find(|p| p.resource_id() == "/humanresources/us")
            .unwrap();
        assert_eq!(hr.actions[0].action_uri, "http:GET");
        assert_eq!(hr.subject.members, vec!["role1", "role2"]);
    }

    #[tokio::test]
    async fn test_set_policy_info_writes_only_changes() {
        let provider = provider();
        let desired = vec![
            PolicyInfo::new(["http:GET"], ["role1", "role3", "role2"], "/humanresources/us"),
            PolicyInfo::new(["http:GET"], ["role1", "role2"], "/profile"),
            PolicyInfo::new(["http:GET"], ["role9"], "/not/provisioned"),
        ];

        let status = provider
            .set_policy_info(&integration(), &app(), &desired)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);

        let store = provider.store();
        assert_eq!(
            store.value(APP, "resrol-httpget-humanresources-us").unwrap(),
            r#"["role1","role2","role3"]"#
        );
        assert_eq!(
            store.value(APP, "resrol-httpget-profile").unwrap(),
            r#"["role2","role1"]"#
        );
        assert!(store.value(APP, "resrol-httpget-not-provisioned").is_none());
    }

    #[tokio::test]
    async fn test_explicit_clearing() {
        let provider = provider();
        let desired = vec![PolicyInfo::new(["http:GET"], Vec::<String>::new(), "/profile")];

        provider
            .set_policy_info(&integration(), &app(), &desired)
            .await
            .unwrap();
        assert_eq!(
            provider.store().value(APP, "resrol-httpget-profile").unwrap(),
            "[]"
        );
    }

    #[tokio::test]
    async fn test_first_failing_write_stops_the_pass() {
        let provider = provider();
        provider
            .store()
            .fail_writes_to("resrol-httpget-humanresources-us");

        let desired = vec![
            PolicyInfo::new(["http:GET"], ["role4"], "/humanresources/us"),
            PolicyInfo::new(["http:GET"], ["role4"], "/profile"),
        ];
        let err = provider
            .set_policy_info(&integration(), &app(), &desired)
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(
            provider.store().value(APP, "resrol-httpget-profile").unwrap(),
            r#"["role2","role1"]"#
        );
    }
}
