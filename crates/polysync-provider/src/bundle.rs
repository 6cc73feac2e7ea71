//! Open Policy Agent bundle provider.
//!
//! A bundle is a `tar.gz` archive holding a `.manifest` and a
//! `bundle/data.json` carrying the canonical policy document. Each bundle is
//! one application; its object id is the bundle name.
//!
//! The integration key selects where bundles live:
//!
//! ```json
//! {"bundle_path": "/var/lib/polysync/bundles"}
//! {"bundle_url": "https://bundles.example.com", "bundles": ["payroll", "crm"]}
//! ```
//!
//! A directory is listed on every discovery pass. Bundle servers expose no
//! listing endpoint, so a URL integration names the bundles it serves.

use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::StatusCode;
use polysync_core::{merge_policies, ApplicationInfo, IntegrationInfo, Policies, PolicyInfo};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{ensure_matches, Provider};

/// Default name of the bundle provider.
pub const OPA_PROVIDER_NAME: &str = "open_policy_agent";

/// Archive path of the manifest.
pub const MANIFEST_PATH: &str = ".manifest";

/// Archive path of the policy document.
pub const DATA_PATH: &str = "bundle/data.json";

/// File extension of stored bundles.
pub const BUNDLE_EXTENSION: &str = ".tar.gz";

/// Bundle manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Bundle revision.
    #[serde(default)]
    pub revision: String,
    /// Root paths.
    #[serde(default)]
    pub roots: Vec<String>,
}

impl Default for BundleManifest {
    fn default() -> Self {
        Self {
            revision: "0".to_string(),
            roots: vec!["bundle".to_string()],
        }
    }
}

/// A decoded policy bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyBundle {
    /// Bundle manifest.
    pub manifest: BundleManifest,
    /// Policy document.
    pub policies: Policies,
}

impl PolicyBundle {
    /// Create a bundle at revision `0`.
    pub fn new(policies: Vec<PolicyInfo>) -> Self {
        Self {
            manifest: BundleManifest::default(),
            policies: Policies::new(policies),
        }
    }

    /// Decode a bundle from tar.gz bytes.
    pub fn from_tar_gz(data: &[u8]) -> ProviderResult<Self> {
        let mut archive = tar::Archive::new(GzDecoder::new(data));

        let mut manifest = None;
        let mut policies = None;

        for entry in archive
            .entries()
            .map_err(|e| ProviderError::bundle(format!("failed to read archive: {e}")))?
        {
            let mut entry =
                entry.map_err(|e| ProviderError::bundle(format!("failed to read entry: {e}")))?;

            let path = entry
                .path()
                .map_err(|e| ProviderError::bundle(format!("invalid path in archive: {e}")))?
                .to_string_lossy()
                .trim_start_matches("./")
                .to_string();

            if path == MANIFEST_PATH || path.ends_with("/.manifest") {
                let mut content = String::new();
                entry.read_to_string(&mut content)?;
                let parsed: BundleManifest = serde_json::from_str(&content)
                    .map_err(|e| ProviderError::bundle(format!("invalid manifest: {e}")))?;
                debug!(revision = %parsed.revision, "found manifest");
                manifest = Some(parsed);
            } else if path == DATA_PATH || path.ends_with("/data.json") || path == "data.json" {
                let mut content = Vec::new();
                entry.read_to_end(&mut content)?;
                let parsed = Policies::from_slice(&content)
                    .map_err(|e| ProviderError::bundle(format!("invalid data.json: {e}")))?;
                debug!(path = %path, policies = parsed.policies.len(), "found policy data");
                policies = Some(parsed);
            }
        }

        let policies = policies.ok_or_else(|| ProviderError::bundle("bundle has no data.json"))?;
        Ok(Self {
            manifest: manifest.unwrap_or_default(),
            policies,
        })
    }

    /// Encode the bundle as tar.gz bytes.
    pub fn to_tar_gz(&self) -> ProviderResult<Vec<u8>> {
        let manifest = serde_json::to_vec(&self.manifest)?;
        let data = self.policies.to_vec_pretty()?;

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        append_file(&mut builder, MANIFEST_PATH, &manifest)?;
        append_file(&mut builder, DATA_PATH, &data)?;

        Ok(builder.into_inner()?.finish()?)
    }

    /// Fold `desired` into the bundle, one entry per resource.
    ///
    /// Resources named in `desired` are replaced; every other resource is
    /// kept. The revision is bumped only when something changed. Returns
    /// whether the bundle changed.
    pub fn apply(&mut self, desired: &[PolicyInfo]) -> bool {
        let replacements = merge_policies(desired);
        let mut merged = merge_policies(
            self.policies
                .policies
                .iter()
                .filter(|p| !replacements.contains_key(p.resource_id())),
        );
        merged.extend(replacements);

        let next: Vec<PolicyInfo> = merged.into_values().collect();
        if next == self.policies.policies {
            return false;
        }

        self.policies.policies = next;
        self.manifest.revision = next_revision(&self.manifest.revision);
        true
    }
}

fn append_file<W: Write>(builder: &mut tar::Builder<W>, path: &str, data: &[u8]) -> ProviderResult<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, path, data)?;
    Ok(())
}

fn next_revision(current: &str) -> String {
    current
        .trim()
        .parse::<u64>()
        .map_or(1, |revision| revision.saturating_add(1))
        .to_string()
}

/// Where a bundle store keeps its archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleLocation {
    /// A local directory of `<name>.tar.gz` files.
    Path(PathBuf),
    /// A bundle server and the bundles it serves.
    Url {
        /// Base URL, without a trailing slash.
        base: String,
        /// Names of the served bundles.
        bundles: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BundleKey {
    #[serde(default)]
    bundle_path: Option<String>,
    #[serde(default)]
    bundle_url: Option<String>,
    #[serde(default)]
    bundles: Vec<String>,
}

impl BundleLocation {
    /// Decode the location from an integration credential blob.
    pub fn from_integration(integration: &IntegrationInfo) -> ProviderResult<Self> {
        let key: BundleKey = integration.decode_key()?;
        if let Some(bad) = key.bundles.iter().find(|name| !is_valid_bundle_name(name)) {
            return Err(ProviderError::config(format!("invalid bundle name: {bad:?}")));
        }

        match (key.bundle_path, key.bundle_url) {
            (Some(path), None) if !path.trim().is_empty() && key.bundles.is_empty() => {
                Ok(Self::Path(PathBuf::from(path)))
            }
            (None, Some(url)) if !url.trim().is_empty() => Ok(Self::Url {
                base: url.trim_end_matches('/').to_string(),
                bundles: key.bundles,
            }),
            (Some(_), None) if !key.bundles.is_empty() => Err(ProviderError::config(
                "bundles are listed from the directory; drop the bundles field",
            )),
            _ => Err(ProviderError::config(
                "bundle key needs exactly one of bundle_path or bundle_url",
            )),
        }
    }
}

fn is_valid_bundle_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.starts_with('.')
}

/// Storage for raw bundle archives.
#[async_trait]
pub trait BundleStore: Send + Sync + fmt::Debug {
    /// Names of the stored bundles.
    async fn list(&self) -> ProviderResult<Vec<String>>;

    /// Read a bundle archive; `None` when it does not exist.
    async fn fetch(&self, name: &str) -> ProviderResult<Option<Vec<u8>>>;

    /// Write a bundle archive.
    async fn store(&self, name: &str, archive: Vec<u8>) -> ProviderResult<()>;
}

/// Bundles as files in a local directory.
#[derive(Debug, Clone)]
pub struct FileBundleStore {
    dir: PathBuf,
}

impl FileBundleStore {
    /// Create a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The bundle directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> ProviderResult<PathBuf> {
        if !is_valid_bundle_name(name) {
            return Err(ProviderError::config(format!("invalid bundle name: {name:?}")));
        }
        Ok(self.dir.join(format!("{name}{BUNDLE_EXTENSION}")))
    }
}

#[async_trait]
impl BundleStore for FileBundleStore {
    async fn list(&self) -> ProviderResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_string_lossy().strip_suffix(BUNDLE_EXTENSION) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn fetch(&self, name: &str) -> ProviderResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(name)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, name: &str, archive: Vec<u8>) -> ProviderResult<()> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let staging = path.with_extension("tmp");
        tokio::fs::write(&staging, archive).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }
}

/// Bundles on an HTTP bundle server.
///
/// Archives live at `<base>/bundles/<name>.tar.gz`; writes are `POST`ed to
/// the same URL. Listing returns the configured bundle names without
/// contacting the server.
#[derive(Debug, Clone)]
pub struct HttpBundleStore {
    client: reqwest::Client,
    base_url: String,
    bundles: Vec<String>,
}

impl HttpBundleStore {
    /// Create a store for the server at `base_url`.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            bundles: Vec::new(),
        }
    }

    /// Set the bundles this server serves.
    pub fn with_bundles<I>(mut self, bundles: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.bundles = bundles.into_iter().map(Into::into).collect();
        self
    }

    fn url_for(&self, name: &str) -> String {
        format!("{}/bundles/{name}{BUNDLE_EXTENSION}", self.base_url)
    }
}

#[async_trait]
impl BundleStore for HttpBundleStore {
    async fn list(&self) -> ProviderResult<Vec<String>> {
        if self.bundles.is_empty() {
            debug!(base_url = %self.base_url, "no bundles configured for bundle server");
        }
        let mut names = self.bundles.clone();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn fetch(&self, name: &str) -> ProviderResult<Option<Vec<u8>>> {
        let url = self.url_for(name);
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ProviderError::backend(format!(
                "bundle server returned status {} for {url}",
                response.status()
            )));
        }
        Ok(Some(response.bytes().await?.to_vec()))
    }

    async fn store(&self, name: &str, archive: Vec<u8>) -> ProviderResult<()> {
        let url = self.url_for(name);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .body(archive)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::backend(format!(
                "bundle server returned status {} for {url}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Provider reading and writing OPA bundles.
#[derive(Debug, Clone)]
pub struct BundleProvider {
    name: String,
    client: reqwest::Client,
}

impl BundleProvider {
    /// Create a provider named `open_policy_agent`.
    pub fn new() -> Self {
        Self::named(OPA_PROVIDER_NAME)
    }

    /// Create a provider answering to a different name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured HTTP client for bundle servers.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Build the store an integration points at.
    pub fn store_for(&self, integration: &IntegrationInfo) -> ProviderResult<Box<dyn BundleStore>> {
        Ok(match BundleLocation::from_integration(integration)? {
            BundleLocation::Path(dir) => Box::new(FileBundleStore::new(dir)),
            BundleLocation::Url { base, bundles } => Box::new(
                HttpBundleStore::new(self.client.clone(), base).with_bundles(bundles),
            ),
        })
    }

    async fn load(store: &dyn BundleStore, name: &str) -> ProviderResult<PolicyBundle> {
        let archive = store
            .fetch(name)
            .await?
            .ok_or_else(|| ProviderError::not_found(format!("bundle {name}")))?;
        PolicyBundle::from_tar_gz(&archive)
    }
}

impl Default for BundleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for BundleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(provider = %self.name))]
    async fn discover_applications(
        &self,
        integration: &IntegrationInfo,
    ) -> ProviderResult<Vec<ApplicationInfo>> {
        if !self.matches(integration) {
            return Ok(Vec::new());
        }

        let store = self.store_for(integration)?;
        let apps: Vec<ApplicationInfo> = store
            .list()
            .await?
            .into_iter()
            .map(|name| {
                ApplicationInfo::new(name.clone(), name)
                    .with_description("Open Policy Agent bundle")
                    .with_service(OPA_PROVIDER_NAME)
            })
            .collect();
        debug!(bundles = apps.len(), "discovered bundles");
        Ok(apps)
    }

    #[instrument(skip_all, fields(provider = %self.name, app = %app.object_id))]
    async fn get_policy_info(
        &self,
        integration: &IntegrationInfo,
        app: &ApplicationInfo,
    ) -> ProviderResult<Vec<PolicyInfo>> {
        ensure_matches(self, integration)?;
        let store = self.store_for(integration)?;
        let bundle = Self::load(store.as_ref(), &app.object_id).await?;
        Ok(bundle.policies.policies)
    }

    #[instrument(skip_all, fields(provider = %self.name, app = %app.object_id))]
    async fn set_policy_info(
        &self,
        integration: &IntegrationInfo,
        app: &ApplicationInfo,
        policies: &[PolicyInfo],
    ) -> ProviderResult<StatusCode> {
        ensure_matches(self, integration)?;
        let store = self.store_for(integration)?;
        let mut bundle = Self::load(store.as_ref(), &app.object_id).await?;

        if !bundle.apply(policies) {
            debug!("bundle already converged");
            return Ok(StatusCode::OK);
        }

        let revision = bundle.manifest.revision.clone();
        store.store(&app.object_id, bundle.to_tar_gz()?).await?;
        metrics::counter!("polysync_rar_updates_total").increment(policies.len() as u64);
        info!(revision = %revision, policies = bundle.policies.policies.len(), "bundle written");
        Ok(StatusCode::CREATED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PolicyBundle {
        PolicyBundle::new(vec![
            PolicyInfo::new(["http:GET:/"], ["allusers"], "/health"),
            PolicyInfo::new(["http:GET"], ["user:bob@example.com"], "/payroll"),
        ])
    }

    #[test]
    fn test_archive_layout() {
        let bytes = sample().to_tar_gz().unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
        let paths: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(paths, vec![MANIFEST_PATH, DATA_PATH]);
    }

    #[test]
    fn test_decode_encoded_bundle() {
        let bundle = sample();
        let decoded = PolicyBundle::from_tar_gz(&bundle.to_tar_gz().unwrap()).unwrap();
        assert_eq!(decoded, bundle);
    }

    #[test]
    fn test_missing_data_is_an_error() {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        append_file(&mut builder, MANIFEST_PATH, br#"{"revision":"3"}"#).unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        let err = PolicyBundle::from_tar_gz(&bytes).unwrap_err();
        assert!(matches!(err, ProviderError::Bundle(_)));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(PolicyBundle::from_tar_gz(b"definitely not gzip").is_err());
    }

    #[test]
    fn test_apply_replaces_per_resource() {
        let mut bundle = sample();
        let changed = bundle.apply(&[PolicyInfo::new(
            ["http:POST"],
            ["user:alice@example.com"],
            "/payroll",
        )]);

        assert!(changed);
        assert_eq!(bundle.manifest.revision, "1");
        let policies = &bundle.policies.policies;
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].resource_id(), "/health");
        assert_eq!(policies[1].subject.members, vec!["user:alice@example.com"]);
        assert_eq!(policies[1].actions[0].action_uri, "http:POST");
    }

    #[test]
    fn test_apply_without_change_keeps_revision() {
        let mut bundle = sample();
        assert!(!bundle.apply(&[]));

        let current = bundle.policies.policies.clone();
        assert!(!bundle.apply(&current));
        assert_eq!(bundle.manifest.revision, "0");
    }

    #[test]
    fn test_next_revision() {
        assert_eq!(next_revision("41"), "42");
        assert_eq!(next_revision("v1.2"), "1");
        assert_eq!(next_revision(""), "1");
    }

    #[test]
    fn test_location_from_key() {
        let path = IntegrationInfo::new(OPA_PROVIDER_NAME, r#"{"bundle_path":"/srv/bundles"}"#);
        assert_eq!(
            BundleLocation::from_integration(&path).unwrap(),
            BundleLocation::Path(PathBuf::from("/srv/bundles"))
        );

        let url = IntegrationInfo::new(
            OPA_PROVIDER_NAME,
            r#"{"bundle_url":"https://b.example.com/","bundles":["payroll"]}"#,
        );
        assert_eq!(
            BundleLocation::from_integration(&url).unwrap(),
            BundleLocation::Url {
                base: "https://b.example.com".to_string(),
                bundles: vec!["payroll".to_string()],
            }
        );

        for bad in [
            "{}",
            r#"{"bundle_path":"/a","bundle_url":"https://b"}"#,
            r#"{"bundle_path":"  "}"#,
            r#"{"bucket":"x"}"#,
            r#"{"bundle_path":"/a","bundles":["x"]}"#,
            r#"{"bundle_url":"https://b","bundles":["../x"]}"#,
            "not json",
        ] {
            let integration = IntegrationInfo::new(OPA_PROVIDER_NAME, bad);
            assert!(
                BundleLocation::from_integration(&integration)
                    .unwrap_err()
                    .is_config(),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn test_server_discovery_reports_configured_bundles() {
        let provider = BundleProvider::new();
        let integration = IntegrationInfo::new(
            OPA_PROVIDER_NAME,
            r#"{"bundle_url":"http://127.0.0.1:9","bundles":["payroll","crm","payroll"]}"#,
        );

        let names: Vec<String> = provider
            .discover_applications(&integration)
            .await
            .unwrap()
            .into_iter()
            .map(|app| app.object_id)
            .collect();
        assert_eq!(names, vec!["crm", "payroll"]);

        let bare = IntegrationInfo::new(OPA_PROVIDER_NAME, r#"{"bundle_url":"http://127.0.0.1:9"}"#);
        assert!(provider.discover_applications(&bare).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_store_urls() {
        let store = HttpBundleStore::new(reqwest::Client::new(), "https://b.example.com")
            .with_bundles(["crm"]);
        assert_eq!(
            store.url_for("crm"),
            "https://b.example.com/bundles/crm.tar.gz"
        );
        assert_eq!(store.list().await.unwrap(), vec!["crm"]);
    }

    #[test]
    fn test_bundle_names_are_confined() {
        let store = FileBundleStore::new("/srv/bundles");
        assert!(store.path_for("payroll").is_ok());
        assert!(store.path_for("../etc/passwd").is_err());
        assert!(store.path_for(".hidden").is_err());
        assert!(store.path_for("").is_err());
    }
}
