//! Resource-Action-Role records and their backend key encoding.
//!
//! A RAR is the backend-native projection of a canonical policy: one grant
//! point identified by `(action, resource)` holding the roles currently
//! granted there. Backends that persist RARs as flat key/value pairs use the
//! [`RarKey`] encoding, `resrol-http<method><path-with-dashes>`:
//!
//! ```text
//! GET /humanresources/us  ->  resrol-httpget-humanresources-us
//! ```

use std::fmt;

use crate::compact::compact_members;
use crate::error::{CoreError, CoreResult};
use crate::model::{ActionInfo, PolicyInfo, HTTP_ACTION_PREFIX};

/// Prefix shared by every encoded RAR key.
pub const RAR_KEY_PREFIX: &str = "resrol-";

const VERB_PREFIX: &str = "http";

/// Derived identity of a backend grant point.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RarKey(String);

impl RarKey {
    /// Derive the key for an action/resource pair.
    ///
    /// The action is lowercased and the resource path normalized (leading
    /// slash, no empty or trailing segments) before slashes become dashes.
    pub fn new(action: &str, resource: &str) -> Self {
        let path = normalize_path(resource).replace('/', "-");
        Self(format!(
            "{RAR_KEY_PREFIX}{VERB_PREFIX}{}{path}",
            action.trim().to_lowercase()
        ))
    }

    /// The encoded key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode an encoded key into `(ACTION, /resource)`.
    ///
    /// Dashes always decode to slashes, so resources whose segments contain
    /// dashes do not survive a round trip.
    pub fn decode(raw: &str) -> CoreResult<(String, String)> {
        let body = raw
            .strip_prefix(RAR_KEY_PREFIX)
            .and_then(|rest| rest.strip_prefix(VERB_PREFIX))
            .ok_or_else(|| CoreError::malformed_key(raw))?;

        let split = body.find('-').ok_or_else(|| CoreError::malformed_key(raw))?;
        let (action, path) = body.split_at(split);
        if action.is_empty() {
            return Err(CoreError::malformed_key(raw));
        }

        Ok((
            action.to_uppercase(),
            normalize_path(&path.replace('-', "/")),
        ))
    }
}

impl fmt::Display for RarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A backend-native grant record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceActionRoles {
    /// Backend resource, e.g. a URL path.
    pub resource: String,
    /// Single backend verb.
    pub action: String,
    /// Granted roles, sorted and deduplicated.
    pub roles: Vec<String>,
}

impl ResourceActionRoles {
    /// Create a RAR; roles are sorted and deduplicated.
    pub fn new(resource: impl Into<String>, action: impl Into<String>, roles: &[String]) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            roles: compact_members(roles, &[]),
        }
    }

    /// Create a RAR from an action URI such as `http:GET:/`.
    pub fn from_action_uri(resource: impl Into<String>, action_uri: &str, roles: &[String]) -> Self {
        Self::new(resource, ActionInfo::new(action_uri).http_method(), roles)
    }

    /// Project a canonical policy onto its RAR using the first action.
    ///
    /// Returns `None` for policies without actions.
    pub fn from_policy(policy: &PolicyInfo) -> Option<Self> {
        let first = policy.actions.first()?;
        Some(Self::new(
            policy.object.resource_id.clone(),
            first.http_method(),
            &policy.subject.members,
        ))
    }

    /// Rebuild a RAR from an encoded key and its stored roles.
    pub fn from_key(raw_key: &str, roles: &[String]) -> CoreResult<Self> {
        let (action, resource) = RarKey::decode(raw_key)?;
        Ok(Self::new(resource, action, roles))
    }

    /// The derived grant-point key.
    pub fn key(&self) -> RarKey {
        RarKey::new(&self.action, &self.resource)
    }

    /// Translate back to canonical form with an `http:` action URI.
    pub fn to_policy(&self) -> PolicyInfo {
        PolicyInfo::new(
            [format!("{HTTP_ACTION_PREFIX}{}", self.action)],
            self.roles.iter().cloned(),
            self.resource.clone(),
        )
    }
}

fn normalize_path(resource: &str) -> String {
    let segments: Vec<&str> = resource
        .trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}
