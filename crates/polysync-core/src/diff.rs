//! Reconciliation of desired canonical policy against existing backend RARs.
//!
//! The engine never creates grant points: a desired policy whose derived key
//! has no existing RAR is ignored. Deletion only happens through an explicit
//! desired policy with an empty member list matched against an existing key.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::compact::merge_policies;
use crate::model::PolicyInfo;
use crate::rar::{RarKey, ResourceActionRoles};

/// Role changes between an existing and a desired role set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDelta {
    /// Roles present on both sides.
    pub retained: Vec<String>,
    /// Roles only in the desired set.
    pub added: Vec<String>,
    /// Roles only in the existing set.
    pub removed: Vec<String>,
}

impl RoleDelta {
    /// True when nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// The converged role set, sorted.
    pub fn target(&self) -> Vec<String> {
        self.retained
            .iter()
            .chain(&self.added)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Split two role lists into retained, added and removed roles.
///
/// Blank roles are ignored and every output list is sorted and unique.
pub fn diff_unique(existing: &[String], desired: &[String]) -> RoleDelta {
    let existing = unique(existing);
    let desired = unique(desired);

    RoleDelta {
        retained: existing.intersection(&desired).map(|r| (*r).to_string()).collect(),
        added: desired.difference(&existing).map(|r| (*r).to_string()).collect(),
        removed: existing.difference(&desired).map(|r| (*r).to_string()).collect(),
    }
}

fn unique(roles: &[String]) -> BTreeSet<&str> {
    roles
        .iter()
        .map(String::as_str)
        .filter(|role| !role.trim().is_empty())
        .collect()
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// RARs to write, each carrying its complete new role set.
    pub updates: Vec<ResourceActionRoles>,
    /// Desired keys with no existing grant point.
    pub ignored: Vec<RarKey>,
    /// Number of matched grant points already converged.
    pub unchanged: usize,
}

/// Compute the full reconciliation plan.
///
/// Updates are ordered by resource id.
pub fn plan_updates(existing: &[ResourceActionRoles], desired: &[PolicyInfo]) -> ReconcilePlan {
    let merged = merge_policies(desired);
    let mut plan = ReconcilePlan::default();

    if existing.is_empty() || merged.is_empty() {
        return plan;
    }

    let existing_by_key: HashMap<RarKey, &ResourceActionRoles> =
        existing.iter().map(|rar| (rar.key(), rar)).collect();
    let mut seen = HashSet::new();

    for policy in merged.values() {
        let Some(desired_rar) = ResourceActionRoles::from_policy(policy) else {
            debug!(resource = %policy.object.resource_id, "policy has no actions, ignoring");
            continue;
        };
        let key = desired_rar.key();
        let first_seen = seen.insert(key.clone());
        debug_assert!(
            first_seen,
            "multiple desired policies derive the same grant point {key}"
        );

        let Some(current) = existing_by_key.get(&key) else {
            debug!(key = %key, "no existing grant point, ignoring desired policy");
            plan.ignored.push(key);
            continue;
        };

        let delta = diff_unique(&current.roles, &desired_rar.roles);
        if delta.is_empty() {
            plan.unchanged += 1;
            continue;
        }

        debug!(
            key = %key,
            added = delta.added.len(),
            removed = delta.removed.len(),
            "grant point needs update"
        );
        plan.updates.push(ResourceActionRoles {
            resource: current.resource.clone(),
            action: current.action.clone(),
            roles: delta.target(),
        });
    }

    plan
}

/// Compute the RAR updates needed to converge `existing` toward `desired`.
pub fn calc_resource_action_roles_for_update(
    existing: &[ResourceActionRoles],
    desired: &[PolicyInfo],
) -> Vec<ResourceActionRoles> {
    plan_updates(existing, desired).updates
}
