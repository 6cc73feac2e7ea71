//! Canonical policy model.
//!
//! These types are the lingua franca between backends. Their serde field
//! names are wire-stable and must not change:
//!
//! ```json
//! {
//!   "policies": [
//!     {
//!       "meta": {"version": "0.5"},
//!       "actions": [{"action_uri": "http:GET:/"}],
//!       "subject": {"members": ["allusers", "allauthenticated"]},
//!       "object": {"resource_id": "aResourceId"}
//!     }
//!   ]
//! }
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Current canonical schema version. Merge always normalizes to this tag.
pub const IDQL_VERSION: &str = "0.5";

/// Prefix of HTTP action URIs (`http:GET:/path`).
pub const HTTP_ACTION_PREFIX: &str = "http:";

/// Policy document metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInfo {
    /// Schema version tag.
    pub version: String,
}

impl Default for MetaInfo {
    fn default() -> Self {
        Self {
            version: IDQL_VERSION.to_string(),
        }
    }
}

/// A single action granted by a policy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionInfo {
    /// Action identifier, e.g. `http:GET:/` or a backend group name.
    pub action_uri: String,
}

impl ActionInfo {
    /// Create an action from its URI.
    pub fn new(action_uri: impl Into<String>) -> Self {
        Self {
            action_uri: action_uri.into(),
        }
    }

    /// The backend verb carried by this action.
    ///
    /// `http:GET:/humanresources` and `http:GET` both yield `GET`. URIs without
    /// the `http:` prefix are returned whole, trimmed.
    pub fn http_method(&self) -> &str {
        let uri = self.action_uri.trim();
        match uri.strip_prefix(HTTP_ACTION_PREFIX) {
            Some(rest) => rest.split(':').next().unwrap_or(rest).trim(),
            None => uri,
        }
    }
}

impl From<&str> for ActionInfo {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

/// Principals a policy applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectInfo {
    /// Principal identifiers, e.g. `user:alice@example.com`.
    pub members: Vec<String>,
}

/// The resource a policy protects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Protected resource identifier.
    pub resource_id: String,
}

/// A canonical, backend-agnostic policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyInfo {
    /// Metadata.
    pub meta: MetaInfo,
    /// Granted actions.
    pub actions: Vec<ActionInfo>,
    /// Principals.
    pub subject: SubjectInfo,
    /// Protected resource.
    pub object: ObjectInfo,
}

impl PolicyInfo {
    /// Create a policy at the current schema version.
    pub fn new<A, M>(actions: A, members: M, resource_id: impl Into<String>) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            meta: MetaInfo::default(),
            actions: actions
                .into_iter()
                .map(|a| ActionInfo::new(a.into()))
                .collect(),
            subject: SubjectInfo {
                members: members.into_iter().map(Into::into).collect(),
            },
            object: ObjectInfo {
                resource_id: resource_id.into(),
            },
        }
    }

    /// The protected resource identifier.
    pub fn resource_id(&self) -> &str {
        &self.object.resource_id
    }
}

/// The canonical policy document exchanged with bundle stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policies {
    /// Policies in document order.
    pub policies: Vec<PolicyInfo>,
}

impl Policies {
    /// Wrap a policy list.
    pub fn new(policies: Vec<PolicyInfo>) -> Self {
        Self { policies }
    }

    /// Parse a document from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> CoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize the document as pretty JSON.
    pub fn to_vec_pretty(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// One synchronizable unit (an app, API, or bundle) within a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    /// Backend-native identifier.
    pub object_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Owning service or stage.
    #[serde(default)]
    pub service: String,
}

impl ApplicationInfo {
    /// Create an application with the given id and name.
    pub fn new(object_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the service.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }
}

/// Selects and authenticates a provider instance.
#[derive(Clone, PartialEq, Eq)]
pub struct IntegrationInfo {
    /// Provider selector, matched case-insensitively.
    pub name: String,
    /// Opaque backend credential blob.
    pub key: Vec<u8>,
}

impl IntegrationInfo {
    /// Create integration info.
    pub fn new(name: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }

    /// Decode the credential blob as JSON.
    pub fn decode_key<T: DeserializeOwned>(&self) -> CoreResult<T> {
        serde_json::from_slice(&self.key)
            .map_err(|e| CoreError::invalid_credentials(&self.name, e.to_string()))
    }
}

impl fmt::Debug for IntegrationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationInfo")
            .field("name", &self.name)
            .field("key", &format_args!("<{} bytes>", self.key.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_field_names() {
        let doc = Policies::new(vec![PolicyInfo::new(
            ["http:GET:/"],
            ["allusers", "allauthenticated"],
            "aResourceId",
        )]);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "policies": [{
                    "meta": {"version": "0.5"},
                    "actions": [{"action_uri": "http:GET:/"}],
                    "subject": {"members": ["allusers", "allauthenticated"]},
                    "object": {"resource_id": "aResourceId"}
                }]
            })
        );
    }

    #[test]
    fn test_parse_document() {
        let raw = br#"{"policies":[{"meta":{"version":"0.4"},"actions":[{"action_uri":"http:POST"}],
            "subject":{"members":[]},"object":{"resource_id":"/profile"}}]}"#;

        let doc = Policies::from_slice(raw).unwrap();
        assert_eq!(doc.policies.len(), 1);
        assert_eq!(doc.policies[0].meta.version, "0.4");
        assert_eq!(doc.policies[0].resource_id(), "/profile");
        assert!(doc.policies[0].subject.members.is_empty());
    }

    #[test]
    fn test_http_method() {
        assert_eq!(ActionInfo::new("http:GET:/").http_method(), "GET");
        assert_eq!(ActionInfo::new("http:post").http_method(), "post");
        assert_eq!(ActionInfo::new(" DELETE ").http_method(), "DELETE");
        assert_eq!(ActionInfo::new("admins").http_method(), "admins");
    }

    #[test]
    fn test_decode_key() {
        #[derive(Debug, Deserialize)]
        struct Key {
            bundle_path: String,
        }

        let integration = IntegrationInfo::new("open_policy_agent", r#"{"bundle_path":"/tmp"}"#);
        let key: Key = integration.decode_key().unwrap();
        assert_eq!(key.bundle_path, "/tmp");

        let bad = IntegrationInfo::new("open_policy_agent", "not json");
        let err = bad.decode_key::<Key>().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_integration_debug_hides_key() {
        let integration = IntegrationInfo::new("noop", "secret-token");
        let debug = format!("{integration:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("12 bytes"));
    }

    #[test]
    fn test_application_builder() {
        let app = ApplicationInfo::new("app-1", "Payroll")
            .with_description("payroll api")
            .with_service("gateway");
        assert_eq!(app.object_id, "app-1");
        assert_eq!(app.service, "gateway");
    }
}
