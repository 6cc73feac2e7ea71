//! Policy merge and compaction.
//!
//! Collapses canonical policies so that exactly one entry exists per
//! `resource_id`, with actions and members deduplicated, sorted and stripped
//! of blank values.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ActionInfo, MetaInfo, ObjectInfo, PolicyInfo, SubjectInfo};

/// Merged policies keyed by resource id, iterated in ascending order.
pub type MergedPolicies = BTreeMap<String, PolicyInfo>;

/// Union two action lists by `action_uri`.
pub fn compact_actions(existing: &[ActionInfo], incoming: &[ActionInfo]) -> Vec<ActionInfo> {
    sort_compact(
        existing
            .iter()
            .chain(incoming)
            .map(|action| action.action_uri.as_str()),
    )
    .into_iter()
    .map(ActionInfo::new)
    .collect()
}

/// Union two member lists.
pub fn compact_members(existing: &[String], incoming: &[String]) -> Vec<String> {
    sort_compact(existing.iter().chain(incoming).map(String::as_str))
}

/// Merge policies into one entry per resource.
///
/// The output version is always [`IDQL_VERSION`](crate::IDQL_VERSION).
pub fn merge_policies<'a, I>(policies: I) -> MergedPolicies
where
    I: IntoIterator<Item = &'a PolicyInfo>,
{
    let mut merged = MergedPolicies::new();

    for policy in policies {
        let resource_id = policy.object.resource_id.clone();
        let entry = merged
            .entry(resource_id.clone())
            .or_insert_with(|| PolicyInfo {
                meta: MetaInfo::default(),
                actions: Vec::new(),
                subject: SubjectInfo::default(),
                object: ObjectInfo { resource_id },
            });

        entry.actions = compact_actions(&entry.actions, &policy.actions);
        entry.subject.members = compact_members(&entry.subject.members, &policy.subject.members);
    }

    merged
}

fn sort_compact<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .filter(|value| !value.trim().is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IDQL_VERSION;
    use proptest::prelude::*;

    fn actions(uris: &[&str]) -> Vec<ActionInfo> {
        uris.iter().copied().map(ActionInfo::new).collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn test_compact_actions() {
        let existing = actions(&["http:POST", "http:GET", " "]);
        let incoming = actions(&["http:GET", "", "http:DELETE"]);

        let compacted = compact_actions(&existing, &incoming);
        assert_eq!(compacted, actions(&["http:DELETE", "http:GET", "http:POST"]));
    }

    #[test]
    fn test_compact_all_blank_is_empty_not_missing() {
        let compacted = compact_members(&strings(&["  ", "\t"]), &strings(&[""]));
        assert!(compacted.is_empty());

        let json = serde_json::to_string(&compacted).unwrap();
        assert_eq!(json, "[]");
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_policies(&[]).is_empty());
    }

    #[test]
    fn test_merge_same_resource() {
        let mut older = PolicyInfo::new(["http:GET"], ["user:bob@example.com"], "/payroll");
        older.meta.version = "0.1".to_string();
        let policies = vec![
            older,
            PolicyInfo::new(
                ["http:POST", "http:GET"],
                ["user:alice@example.com", "user:bob@example.com"],
                "/payroll",
            ),
            PolicyInfo::new(["http:GET"], ["allusers"], "/health"),
        ];

        let merged = merge_policies(&policies);
        assert_eq!(merged.len(), 2);

        let payroll = &merged["/payroll"];
        assert_eq!(payroll.meta.version, IDQL_VERSION);
        assert_eq!(payroll.actions, actions(&["http:GET", "http:POST"]));
        assert_eq!(
            payroll.subject.members,
            strings(&["user:alice@example.com", "user:bob@example.com"])
        );
        assert_eq!(merged["/health"].subject.members, strings(&["allusers"]));
    }

    #[test]
    fn test_merge_keeps_empty_members() {
        let merged = merge_policies(&[PolicyInfo::new(["http:GET"], Vec::<String>::new(), "/a")]);
        assert!(merged["/a"].subject.members.is_empty());
    }

    #[test]
    fn test_merge_iterates_in_resource_order() {
        let policies = vec![
            PolicyInfo::new(["http:GET"], ["a"], "/zeta"),
            PolicyInfo::new(["http:GET"], ["a"], "/alpha"),
        ];
        let keys: Vec<_> = merge_policies(&policies).into_keys().collect();
        assert_eq!(keys, vec!["/alpha".to_string(), "/zeta".to_string()]);
    }

    fn policy_strategy() -> impl Strategy<Value = PolicyInfo> {
        (
            prop::collection::vec("[ a-c]{0,3}", 0..4),
            prop::collection::vec("[ x-z]{0,3}", 0..4),
            prop::sample::select(vec!["/r1", "/r2"]),
        )
            .prop_map(|(acts, members, resource)| PolicyInfo::new(acts, members, resource))
    }

    proptest! {
        #[test]
        fn prop_compact_actions_idempotent(uris in prop::collection::vec("[ a-d]{0,4}", 0..8)) {
            let input: Vec<ActionInfo> = uris.iter().map(|u| ActionInfo::new(u.as_str())).collect();
            let once = compact_actions(&input, &[]);
            prop_assert_eq!(compact_actions(&once, &once), once);
        }

        #[test]
        fn prop_compact_members_idempotent(members in prop::collection::vec("[ m-p]{0,4}", 0..8)) {
            let once = compact_members(&members, &[]);
            prop_assert_eq!(compact_members(&once, &once), once);
        }

        #[test]
        fn prop_merge_associative(
            first in prop::collection::vec(policy_strategy(), 0..4),
            second in prop::collection::vec(policy_strategy(), 0..4),
        ) {
            let staged: Vec<PolicyInfo> = merge_policies(&first)
                .into_values()
                .chain(second.iter().cloned())
                .collect();
            let all: Vec<PolicyInfo> = first.iter().chain(&second).cloned().collect();

            prop_assert_eq!(merge_policies(&staged), merge_policies(&all));
        }
    }
}
