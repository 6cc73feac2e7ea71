//! Registry of known integrations and the applications discovered in them.

use std::fmt;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use polysync_core::{ApplicationInfo, IntegrationInfo};
use tracing::debug;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

/// A catalogued application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRecord {
    /// Catalog id.
    pub id: String,
    /// Id of the integration the application lives in.
    pub integration_id: String,
    /// Backend description.
    pub info: ApplicationInfo,
}

/// A catalogued integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationRecord {
    /// Catalog id.
    pub id: String,
    /// Provider selector and credentials.
    pub info: IntegrationInfo,
}

/// Storage for integrations and applications.
///
/// Implementations must tolerate concurrent calls; discovery workers write
/// while synchronizations read.
#[async_trait]
pub trait ApplicationCatalog: Send + Sync + fmt::Debug {
    /// Look up an application by catalog id.
    async fn find_application(&self, id: &str) -> SyncResult<ApplicationRecord>;

    /// Look up an integration by catalog id.
    async fn find_integration(&self, id: &str) -> SyncResult<IntegrationRecord>;

    /// Every known integration.
    async fn list_integrations(&self) -> SyncResult<Vec<IntegrationRecord>>;

    /// Record a discovered application unless the integration already has one
    /// with the same object id. Returns the record and whether it is new.
    async fn create_if_absent(
        &self,
        integration_id: &str,
        info: ApplicationInfo,
    ) -> SyncResult<(ApplicationRecord, bool)>;
}

/// Process-local [`ApplicationCatalog`].
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    integrations: DashMap<String, IntegrationRecord>,
    applications: DashMap<String, ApplicationRecord>,
    by_object_id: DashMap<(String, String), String>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an integration under a caller-chosen id.
    pub fn add_integration(&self, id: impl Into<String>, info: IntegrationInfo) -> IntegrationRecord {
        let record = IntegrationRecord {
            id: id.into(),
            info,
        };
        self.integrations.insert(record.id.clone(), record.clone());
        record
    }

    /// Register an application directly, bypassing discovery.
    pub fn add_application(
        &self,
        integration_id: &str,
        info: ApplicationInfo,
    ) -> ApplicationRecord {
        let record = ApplicationRecord {
            id: Uuid::now_v7().to_string(),
            integration_id: integration_id.to_string(),
            info,
        };
        self.by_object_id.insert(
            (integration_id.to_string(), record.info.object_id.clone()),
            record.id.clone(),
        );
        self.applications.insert(record.id.clone(), record.clone());
        record
    }

    /// Every application, sorted by integration then object id.
    pub fn applications(&self) -> Vec<ApplicationRecord> {
        let mut apps: Vec<ApplicationRecord> =
            self.applications.iter().map(|e| e.value().clone()).collect();
        apps.sort_by(|a, b| {
            (a.integration_id.as_str(), a.info.object_id.as_str())
                .cmp(&(b.integration_id.as_str(), b.info.object_id.as_str()))
        });
        apps
    }

    /// Find an application by its backend object id.
    pub fn find_by_object_id(&self, integration_id: &str, object_id: &str) -> Option<ApplicationRecord> {
        let id = self
            .by_object_id
            .get(&(integration_id.to_string(), object_id.to_string()))?
            .value()
            .clone();
        self.applications.get(&id).map(|e| e.value().clone())
    }
}

#[async_trait]
impl ApplicationCatalog for InMemoryCatalog {
    async fn find_application(&self, id: &str) -> SyncResult<ApplicationRecord> {
        self.applications
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| SyncError::ApplicationNotFound(id.to_string()))
    }

    async fn find_integration(&self, id: &str) -> SyncResult<IntegrationRecord> {
        self.integrations
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| SyncError::IntegrationNotFound(id.to_string()))
    }

    async fn list_integrations(&self) -> SyncResult<Vec<IntegrationRecord>> {
        let mut integrations: Vec<IntegrationRecord> =
            self.integrations.iter().map(|e| e.value().clone()).collect();
        integrations.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(integrations)
    }

    async fn create_if_absent(
        &self,
        integration_id: &str,
        info: ApplicationInfo,
    ) -> SyncResult<(ApplicationRecord, bool)> {
        if !self.integrations.contains_key(integration_id) {
            return Err(SyncError::IntegrationNotFound(integration_id.to_string()));
        }

        let key = (integration_id.to_string(), info.object_id.clone());
        let record = match self.by_object_id.entry(key) {
            Entry::Occupied(existing) => {
                let id = existing.get().clone();
                drop(existing);
                let record = self
                    .applications
                    .get(&id)
                    .map(|e| e.value().clone())
                    .ok_or_else(|| SyncError::catalog(format!("dangling application index {id}")))?;
                return Ok((record, false));
            }
            Entry::Vacant(slot) => {
                let record = ApplicationRecord {
                    id: Uuid::now_v7().to_string(),
                    integration_id: integration_id.to_string(),
                    info,
                };
                self.applications.insert(record.id.clone(), record.clone());
                slot.insert(record.id.clone());
                record
            }
        };

        debug!(
            integration = %integration_id,
            object_id = %record.info.object_id,
            id = %record.id,
            "application recorded"
        );
        Ok((record, true))
    }
}
