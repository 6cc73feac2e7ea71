//! Cloud-IAM style provider where directory groups are the grant points.
//!
//! Every group attached to an application is one RAR: the group name is the
//! action, the application object id is the resource and the members, as
//! `user:<email>`, are the roles. Member ids are resolved to emails
//! concurrently; principals that cannot be resolved are left out.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use http::StatusCode;
use polysync_core::{
    diff_unique, plan_updates, ApplicationInfo, IntegrationInfo, PolicyInfo, RarKey,
    ResourceActionRoles,
};
use polysync_tasks::FanOut;
use tracing::{debug, info, instrument, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{ensure_matches, Provider, Retention};

/// Member prefix for user principals.
pub const USER_PREFIX: &str = "user:";

/// A directory group bound to an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Backend group id.
    pub id: String,
    /// Group name, used as the action.
    pub name: String,
    /// Backend principal ids of the members.
    pub member_ids: Vec<String>,
}

impl Group {
    /// Create a group without members.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            member_ids: Vec::new(),
        }
    }

    /// Set the member ids.
    pub fn with_members<I>(mut self, member_ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.member_ids = member_ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Directory API of a cloud IAM backend.
#[async_trait]
pub trait GroupDirectory: Send + Sync + fmt::Debug {
    /// Applications whose access is managed through groups.
    async fn list_applications(&self) -> ProviderResult<Vec<ApplicationInfo>>;

    /// Groups bound to an application.
    async fn list_groups(&self, app_id: &str) -> ProviderResult<Vec<Group>>;

    /// Email address of a principal.
    async fn principal_email(&self, principal_id: &str) -> ProviderResult<String>;

    /// Principal id owning an email address.
    async fn find_principal(&self, email: &str) -> ProviderResult<String>;

    /// Add a principal to a group.
    async fn add_member(&self, group_id: &str, principal_id: &str) -> ProviderResult<()>;

    /// Remove a principal from a group.
    async fn remove_member(&self, group_id: &str, principal_id: &str) -> ProviderResult<()>;
}

/// A group with its members resolved to `user:<email>`.
#[derive(Debug)]
struct ResolvedGroup {
    group: Group,
    rar: ResourceActionRoles,
    principals: HashMap<String, String>,
}

/// Provider backed by a [`GroupDirectory`].
#[derive(Debug)]
pub struct GroupProvider<D> {
    name: String,
    directory: Arc<D>,
    fan_out: FanOut,
}

impl<D: GroupDirectory + 'static> GroupProvider<D> {
    /// Create a provider answering to `name`.
    pub fn new(name: impl Into<String>, directory: Arc<D>) -> Self {
        Self {
            name: name.into(),
            directory,
            fan_out: FanOut::unbounded(),
        }
    }

    /// Bound member resolution concurrency.
    pub fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// The underlying directory.
    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    async fn resolve_groups(&self, app_id: &str) -> ProviderResult<Vec<ResolvedGroup>> {
        let groups = self.directory.list_groups(app_id).await?;
        let mut resolved = Vec::with_capacity(groups.len());

        for group in groups {
            let directory = self.directory.clone();
            let pairs = self
                .fan_out
                .run(group.member_ids.clone(), move |id: String| {
                    let directory = directory.clone();
                    async move {
                        let email = directory.principal_email(&id).await?;
                        Ok::<_, ProviderError>((format!("{USER_PREFIX}{email}"), id))
                    }
                })
                .await;

            if pairs.len() < group.member_ids.len() {
                debug!(
                    group = %group.name,
                    unresolved = group.member_ids.len() - pairs.len(),
                    "dropped unresolvable principals"
                );
            }

            let principals: HashMap<String, String> = pairs.into_iter().collect();
            let members: Vec<String> = principals.keys().cloned().collect();
            let rar = ResourceActionRoles::new(app_id, group.name.clone(), &members);
            resolved.push(ResolvedGroup {
                group,
                rar,
                principals,
            });
        }
        Ok(resolved)
    }

    async fn apply_update(&self, current: &ResolvedGroup, target: &[String]) -> ProviderResult<()> {
        let delta = diff_unique(&current.rar.roles, target);

        for member in &delta.added {
            let Some(email) = member.strip_prefix(USER_PREFIX) else {
                continue;
            };
            let principal = self.directory.find_principal(email).await?;
            self.directory.add_member(&current.group.id, &principal).await?;
            debug!(group = %current.group.name, member = %member, "member added");
        }

        for member in &delta.removed {
            if let Some(principal) = current.principals.get(member) {
                self.directory
                    .remove_member(&current.group.id, principal)
                    .await?;
                debug!(group = %current.group.name, member = %member, "member removed");
            }
        }
        Ok(())
    }
}

/// The desired policies granting `key`, narrowed to that one group.
///
/// A policy naming several groups contributes to each of them. Only
/// `user:` members can join a group; anything else is dropped here so
/// the group converges instead of reporting a pending change forever.
fn desired_for_group(key: &RarKey, group_name: &str, policies: &[PolicyInfo]) -> Vec<PolicyInfo> {
    policies
        .iter()
        .filter(|p| {
            p.actions
                .iter()
                .any(|a| RarKey::new(a.http_method(), p.resource_id()) == *key)
        })
        .map(|p| {
            let members = p.subject.members.iter().filter(|member| {
                let is_user = member.starts_with(USER_PREFIX);
                if !is_user {
                    warn!(
                        group = %group_name,
                        member = %member,
                        "only user principals can join a group, skipping"
                    );
                }
                is_user
            });
            PolicyInfo::new([group_name], members.cloned(), p.resource_id())
        })
        .collect()
}

#[async_trait]
impl<D: GroupDirectory + 'static> Provider for GroupProvider<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn retention(&self) -> Retention {
        Retention::Action
    }

    async fn discover_applications(
        &self,
        integration: &IntegrationInfo,
    ) -> ProviderResult<Vec<ApplicationInfo>> {
        if !self.matches(integration) {
            return Ok(Vec::new());
        }
        self.directory.list_applications().await
    }

    #[instrument(skip_all, fields(provider = %self.name, app = %app.object_id))]
    async fn get_policy_info(
        &self,
        integration: &IntegrationInfo,
        app: &ApplicationInfo,
    ) -> ProviderResult<Vec<PolicyInfo>> {
        ensure_matches(self, integration)?;
        let groups = self.resolve_groups(&app.object_id).await?;
        Ok(groups.iter().map(|g| group_policy(&g.rar)).collect())
    }

    #[instrument(skip_all, fields(provider = %self.name, app = %app.object_id))]
    async fn set_policy_info(
        &self,
        integration: &IntegrationInfo,
        app: &ApplicationInfo,
        policies: &[PolicyInfo],
    ) -> ProviderResult<StatusCode> {
        ensure_matches(self, integration)?;

        let groups = self.resolve_groups(&app.object_id).await?;
        let mut claimed = HashSet::new();
        let mut updated = 0_usize;
        let mut unchanged = 0_usize;

        // Every group of an application shares its resource, so each group
        // is planned on its own to keep members from crossing over.
        for group in &groups {
            let key = group.rar.key();
            let desired = desired_for_group(&key, &group.group.name, policies);
            if desired.is_empty() {
                continue;
            }
            claimed.insert(key);

            let plan = plan_updates(std::slice::from_ref(&group.rar), &desired);
            unchanged += plan.unchanged;
            for update in &plan.updates {
                self.apply_update(group, &update.roles).await?;
                metrics::counter!("polysync_rar_updates_total").increment(1);
                updated += 1;
            }
        }

        let mut ignored = 0_usize;
        for policy in policies {
            for action in &policy.actions {
                let key = RarKey::new(action.http_method(), policy.resource_id());
                if !claimed.contains(&key) {
                    warn!(key = %key, "no group bound for desired policy, ignoring");
                    ignored += 1;
                }
            }
        }

        info!(updated, unchanged, ignored, "group memberships reconciled");
        Ok(StatusCode::OK)
    }
}

// Group names are backend vocabulary and carry no `http:` prefix.
fn group_policy(rar: &ResourceActionRoles) -> PolicyInfo {
    PolicyInfo::new(
        [rar.action.clone()],
        rar.roles.iter().cloned(),
        rar.resource.clone(),
    )
}

/// Process-local [`GroupDirectory`].
#[derive(Debug, Default)]
pub struct InMemoryGroupDirectory {
    applications: DashMap<String, ApplicationInfo>,
    groups: DashMap<String, (String, Group)>,
    principals: DashMap<String, String>,
}

impl InMemoryGroupDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an application discoverable.
    pub fn add_application(&self, app: ApplicationInfo) {
        self.applications.insert(app.object_id.clone(), app);
    }

    /// Bind a group to an application.
    pub fn add_group(&self, app_id: &str, group: Group) {
        self.groups
            .insert(group.id.clone(), (app_id.to_string(), group));
    }

    /// Register a principal and its email.
    pub fn add_principal(&self, principal_id: impl Into<String>, email: impl Into<String>) {
        self.principals.insert(principal_id.into(), email.into());
    }

    /// Member ids of a group, sorted.
    pub fn members(&self, group_id: &str) -> Vec<String> {
        let mut members = self
            .groups
            .get(group_id)
            .map(|entry| entry.1.member_ids.clone())
            .unwrap_or_default();
        members.sort();
        members
    }
}

#[async_trait]
impl GroupDirectory for InMemoryGroupDirectory {
    async fn list_applications(&self) -> ProviderResult<Vec<ApplicationInfo>> {
        let mut apps: Vec<ApplicationInfo> =
            self.applications.iter().map(|e| e.value().clone()).collect();
        apps.sort_by(|a, b| a.object_id.cmp(&b.object_id));
        Ok(apps)
    }

    async fn list_groups(&self, app_id: &str) -> ProviderResult<Vec<Group>> {
        let mut groups: Vec<Group> = self
            .groups
            .iter()
            .filter(|e| e.value().0 == app_id)
            .map(|e| e.value().1.clone())
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn principal_email(&self, principal_id: &str) -> ProviderResult<String> {
        self.principals
            .get(principal_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| ProviderError::not_found(format!("principal {principal_id}")))
    }

    async fn find_principal(&self, email: &str) -> ProviderResult<String> {
        self.principals
            .iter()
            .find(|e| e.value().eq_ignore_ascii_case(email))
            .map(|e| e.key().clone())
            .ok_or_else(|| ProviderError::not_found(format!("principal with email {email}")))
    }

    async fn add_member(&self, group_id: &str, principal_id: &str) -> ProviderResult<()> {
        let mut entry = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| ProviderError::not_found(format!("group {group_id}")))?;
        let members = &mut entry.1.member_ids;
        if !members.iter().any(|m| m == principal_id) {
            members.push(principal_id.to_string());
        }
        Ok(())
    }

    async fn remove_member(&self, group_id: &str, principal_id: &str) -> ProviderResult<()> {
        let mut entry = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| ProviderError::not_found(format!("group {group_id}")))?;
        entry.1.member_ids.retain(|m| m != principal_id);
        Ok(())
    }
}
