//! # Polysync Core
//!
//! The canonical policy model and the pure algorithms that every backend
//! adapter shares:
//!
//! - [`model`]: wire-stable canonical documents ([`PolicyInfo`], [`Policies`])
//!   and the value inputs of one operation ([`ApplicationInfo`],
//!   [`IntegrationInfo`])
//! - [`compact`]: merge/compaction to one policy per protected resource
//! - [`rar`]: backend-native Resource-Action-Role records and their key codec
//! - [`diff`]: the reconciliation engine computing minimal RAR updates
//!
//! Nothing in this crate performs I/O.
//!
//! ```
//! use polysync_core::{calc_resource_action_roles_for_update, PolicyInfo, ResourceActionRoles};
//!
//! let existing = vec![ResourceActionRoles::new(
//!     "/humanresources/us",
//!     "GET",
//!     &["role1".to_string(), "role2".to_string()],
//! )];
//! let desired = vec![PolicyInfo::new(
//!     ["http:GET"],
//!     ["role1", "role3", "role2"],
//!     "/humanresources/us",
//! )];
//!
//! let updates = calc_resource_action_roles_for_update(&existing, &desired);
//! assert_eq!(updates[0].roles, vec!["role1", "role2", "role3"]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod compact;
pub mod diff;
pub mod error;
pub mod model;
pub mod rar;

pub use compact::{compact_actions, compact_members, merge_policies, MergedPolicies};
pub use diff::{
    calc_resource_action_roles_for_update, diff_unique, plan_updates, ReconcilePlan, RoleDelta,
};
pub use error::{CoreError, CoreResult};
pub use model::{
    ActionInfo, ApplicationInfo, IntegrationInfo, MetaInfo, ObjectInfo, Policies, PolicyInfo,
    SubjectInfo, HTTP_ACTION_PREFIX, IDQL_VERSION,
};
pub use rar::{RarKey, ResourceActionRoles, RAR_KEY_PREFIX};
