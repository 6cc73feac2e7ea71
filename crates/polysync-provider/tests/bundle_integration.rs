//! Bundle provider against a real directory.

use polysync_core::{ApplicationInfo, IntegrationInfo, PolicyInfo};
use polysync_provider::{
    BundleProvider, BundleStore, FileBundleStore, PolicyBundle, Provider, ProviderError,
    StatusCode, OPA_PROVIDER_NAME,
};
use tempfile::TempDir;

fn integration(dir: &TempDir) -> IntegrationInfo {
    let key = serde_json::json!({ "bundle_path": dir.path() }).to_string();
    IntegrationInfo::new(OPA_PROVIDER_NAME, key)
}

async fn seed(dir: &TempDir, name: &str, policies: Vec<PolicyInfo>) {
    let archive = PolicyBundle::new(policies).to_tar_gz().unwrap();
    FileBundleStore::new(dir.path())
        .store(name, archive)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_discover_lists_bundles() {
    let dir = TempDir::new().unwrap();
    seed(&dir, "payroll", vec![]).await;
    seed(&dir, "crm", vec![]).await;
    std::fs::write(dir.path().join("README.md"), "not a bundle").unwrap();

    let apps = BundleProvider::new()
        .discover_applications(&integration(&dir))
        .await
        .unwrap();
    let ids: Vec<_> = apps.iter().map(|a| a.object_id.as_str()).collect();
    assert_eq!(ids, vec!["crm", "payroll"]);
}

#[tokio::test]
async fn test_discover_missing_directory_is_empty() {
    let dir = TempDir::new().unwrap();
    let key = serde_json::json!({ "bundle_path": dir.path().join("absent") }).to_string();
    let integration = IntegrationInfo::new(OPA_PROVIDER_NAME, key);

    let apps = BundleProvider::new()
        .discover_applications(&integration)
        .await
        .unwrap();
    assert!(apps.is_empty());
}

#[tokio::test]
async fn test_write_merges_and_persists() {
    let dir = TempDir::new().unwrap();
    seed(
        &dir,
        "payroll",
        vec![
            PolicyInfo::new(["http:GET"], ["user:bob@example.com"], "/payroll"),
            PolicyInfo::new(["http:GET:/"], ["allusers"], "/health"),
        ],
    )
    .await;

    let provider = BundleProvider::new();
    let app = ApplicationInfo::new("payroll", "payroll");
    let desired = vec![PolicyInfo::new(
        ["http:GET", "http:POST"],
        ["user:alice@example.com"],
        "/payroll",
    )];

    let status = provider
        .set_policy_info(&integration(&dir), &app, &desired)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let policies = provider
        .get_policy_info(&integration(&dir), &app)
        .await
        .unwrap();
    assert_eq!(policies.len(), 2);
    assert_eq!(policies[0].resource_id(), "/health");
    assert_eq!(policies[1].subject.members, vec!["user:alice@example.com"]);

    let raw = std::fs::read(dir.path().join("payroll.tar.gz")).unwrap();
    assert_eq!(PolicyBundle::from_tar_gz(&raw).unwrap().manifest.revision, "1");

    let again = provider
        .set_policy_info(&integration(&dir), &app, &desired)
        .await
        .unwrap();
    assert_eq!(again, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_bundle_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = ApplicationInfo::new("ghost", "ghost");

    let err = BundleProvider::new()
        .get_policy_info(&integration(&dir), &app)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)));
}

#[tokio::test]
async fn test_bad_key_is_config_error() {
    let app = ApplicationInfo::new("payroll", "payroll");
    let integration = IntegrationInfo::new(OPA_PROVIDER_NAME, r#"{"bucket":"gs://x"}"#);

    let err = BundleProvider::new()
        .get_policy_info(&integration, &app)
        .await
        .unwrap_err();
    assert!(err.is_config());
}
