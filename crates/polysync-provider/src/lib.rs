//! # Polysync Provider
//!
//! The capability contract every policy backend implements, plus the
//! adapters that ship with Polysync:
//!
//! | Provider | Backend | Grant point |
//! |----------|---------|-------------|
//! | [`NoopProvider`] | none | canned policy |
//! | [`NamedValueProvider`] | API gateway named values | `resrol-…` named value |
//! | [`BundleProvider`] | OPA bundle store | one policy per resource |
//! | [`GroupProvider`] | cloud IAM directory | group membership |
//!
//! Providers are looked up by name through a [`ProviderRegistry`]:
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use polysync_core::IntegrationInfo;
//! use polysync_provider::{BundleProvider, NoopProvider, ProviderRegistry};
//!
//! let registry = ProviderRegistry::new()
//!     .with(Arc::new(NoopProvider::new()))
//!     .unwrap()
//!     .with(Arc::new(BundleProvider::new()))
//!     .unwrap();
//!
//! let integration = IntegrationInfo::new("Open_Policy_Agent", r#"{"bundle_path":"/tmp"}"#);
//! assert_eq!(registry.resolve(&integration).unwrap().name(), "open_policy_agent");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bundle;
pub mod error;
pub mod group;
pub mod named_value;
pub mod noop;
pub mod provider;

pub use bundle::{
    BundleLocation, BundleManifest, BundleProvider, BundleStore, FileBundleStore, HttpBundleStore,
    PolicyBundle, OPA_PROVIDER_NAME,
};
pub use error::{ProviderError, ProviderResult};
pub use group::{Group, GroupDirectory, GroupProvider, InMemoryGroupDirectory};
pub use named_value::{InMemoryNamedValueStore, NamedValue, NamedValueProvider, NamedValueStore};
pub use noop::{NoopProvider, NOOP_PROVIDER_NAME};
pub use provider::{ensure_matches, Provider, ProviderRegistry, Retention};

pub use http::StatusCode;
