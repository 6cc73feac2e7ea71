//! Re-addressing copied policy for its destination.
//!
//! Source and destination policies are paired by position. The pairing is
//! only accepted when it is unambiguous: both lists have the same length,
//! the same number of distinct resources, and every source resource lands
//! on exactly one destination resource. Anything else is a shape mismatch;
//! no partial match is attempted.

use std::collections::{HashMap, HashSet};

use polysync_core::PolicyInfo;
use polysync_provider::Retention;

use crate::error::{SyncError, SyncResult};

/// Apply the retention rule a destination provider asks for.
pub fn retain(
    retention: Retention,
    from: &[PolicyInfo],
    to: &[PolicyInfo],
) -> SyncResult<Vec<PolicyInfo>> {
    match retention {
        Retention::Resource => retain_resource(from, to),
        Retention::Action => retain_action(from, to),
    }
}

/// Keep the source's actions and subject, take the destination's resource.
pub fn retain_resource(from: &[PolicyInfo], to: &[PolicyInfo]) -> SyncResult<Vec<PolicyInfo>> {
    check_shape(from, to)?;
    Ok(from
        .iter()
        .zip(to)
        .map(|(source, dest)| PolicyInfo {
            meta: source.meta.clone(),
            actions: source.actions.clone(),
            subject: source.subject.clone(),
            object: dest.object.clone(),
        })
        .collect())
}

/// Keep the source's subject, take the destination's actions and resource.
pub fn retain_action(from: &[PolicyInfo], to: &[PolicyInfo]) -> SyncResult<Vec<PolicyInfo>> {
    check_shape(from, to)?;
    Ok(from
        .iter()
        .zip(to)
        .map(|(source, dest)| PolicyInfo {
            meta: source.meta.clone(),
            actions: dest.actions.clone(),
            subject: source.subject.clone(),
            object: dest.object.clone(),
        })
        .collect())
}

fn check_shape(from: &[PolicyInfo], to: &[PolicyInfo]) -> SyncResult<()> {
    if from.len() != to.len() {
        return Err(SyncError::shape_mismatch(format!(
            "{} source policies but {} destination policies",
            from.len(),
            to.len()
        )));
    }

    let from_resources = distinct_resources(from);
    let to_resources = distinct_resources(to);
    if from_resources != to_resources {
        return Err(SyncError::shape_mismatch(format!(
            "{from_resources} distinct source resources but {to_resources} destination resources"
        )));
    }

    let mut mapping: HashMap<&str, &str> = HashMap::new();
    for (source, dest) in from.iter().zip(to) {
        let target = mapping
            .entry(source.resource_id())
            .or_insert_with(|| dest.resource_id());
        if *target != dest.resource_id() {
            return Err(SyncError::shape_mismatch(format!(
                "source resource {} pairs with both {} and {}",
                source.resource_id(),
                target,
                dest.resource_id()
            )));
        }
    }
    Ok(())
}

fn distinct_resources(policies: &[PolicyInfo]) -> usize {
    policies
        .iter()
        .map(PolicyInfo::resource_id)
        .collect::<HashSet<_>>()
        .len()
}
