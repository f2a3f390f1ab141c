//! End-to-end runs against directory-backed buckets

mod common;

use std::path::Path;
use std::sync::Arc;

use ::common::prelude::*;
use ::common::settings::{PublicAccessBlockRule, VersioningStatus};

fn write(root: &Path, bucket: &str, key: &str, body: &str) {
    let path = root.join(bucket).join(key);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

async fn seed_source(provider: &LocalStorageProvider, root: &Path) {
    let snapshot = common::configured_snapshot();
    provider.create_bucket("media.assets", "local").await.unwrap();
    provider
        .put_versioning("media.assets", VersioningStatus::Enabled)
        .await
        .unwrap();
    provider
        .put_cors("media.assets", snapshot.cors_rules.configured().unwrap())
        .await
        .unwrap();

    write(root, "media.assets", "photos/2024/beach.jpg", "jpeg");
    write(root, "media.assets", "photos/2024/city.jpg", "more jpeg");
    write(root, "media.assets", "README", "assets for the site");
}

#[tokio::test]
async fn test_local_migration_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let provider = LocalStorageProvider::new(root.path());
    seed_source(&provider, root.path()).await;

    let migrator = Migrator::new(Arc::new(provider.clone()), common::fast_config());
    let report = migrator
        .migrate(
            &NamingPolicy::default(),
            &common::request(&["media.assets"], true),
        )
        .await
        .unwrap();
    assert!(report.is_success());

    let outcome = &report.outcomes.as_ref().unwrap()[0];
    assert!(outcome.locator.starts_with("file://"));
    assert!(outcome.locator.ends_with("media-assets"));
    assert_eq!(outcome.copy.result().unwrap().objects_copied, 3);

    let copied = std::fs::read_to_string(root.path().join("media-assets/photos/2024/city.jpg"))
        .unwrap();
    assert_eq!(copied, "more jpeg");

    assert_eq!(
        provider.get_versioning("media-assets").await.unwrap(),
        VersioningStatus::Enabled
    );
    assert_eq!(
        &provider.get_cors("media-assets").await.unwrap(),
        common::configured_snapshot().cors_rules.configured().unwrap()
    );
    assert_eq!(
        provider.get_public_access_block("media-assets").await.unwrap(),
        PublicAccessBlockRule::locked_down()
    );
    assert!(matches!(
        provider.get_lifecycle("media-assets").await,
        Err(ProviderError::NotConfigured)
    ));
    let tags = provider.get_tags("media-assets").await.unwrap();
    assert_eq!(tags.get("migrated-by").map(String::as_str), Some("rebucket"));

    // source is never modified
    assert!(matches!(
        provider.get_public_access_block("media.assets").await,
        Err(ProviderError::NotConfigured)
    ));
}

#[tokio::test]
async fn test_local_rerun_converges() {
    let root = tempfile::tempdir().unwrap();
    let provider = LocalStorageProvider::new(root.path());
    seed_source(&provider, root.path()).await;

    let migrator = Migrator::new(Arc::new(provider.clone()), common::fast_config());
    let request = common::request(&["media.assets"], true);
    migrator
        .migrate(&NamingPolicy::default(), &request)
        .await
        .unwrap();

    write(root.path(), "media.assets", "photos/2024/new.jpg", "fresh");
    let report = migrator
        .migrate(&NamingPolicy::default(), &request)
        .await
        .unwrap();
    assert!(report.is_success());

    let provisioning = report.outcomes.as_ref().unwrap()[0]
        .provisioning
        .clone()
        .unwrap();
    assert!(!provisioning.changed());
    assert!(root.path().join("media-assets/photos/2024/new.jpg").exists());
}

#[tokio::test]
async fn test_local_identity_check() {
    let root = tempfile::tempdir().unwrap();
    let provider = LocalStorageProvider::new(root.path());
    let identity = provider.verify_identity().await.unwrap();
    assert_eq!(identity.provider, "local");

    let missing = LocalStorageProvider::new(root.path().join("nope"));
    assert!(missing.verify_identity().await.is_err());
}
