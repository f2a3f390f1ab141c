//! Shared fixtures for migration integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::prelude::*;
use common::provider::{Identity, ObjectSummary};
use common::settings::{
    CorsRule, EncryptionRule, LifecycleRule, PublicAccessBlockRule, SseAlgorithm,
    VersioningStatus,
};
use tokio::sync::watch;

/// A source bucket with every facet configured.
pub fn configured_snapshot() -> BucketSettingsSnapshot {
    BucketSettingsSnapshot {
        versioning: Facet::Configured(VersioningStatus::Enabled),
        encryption: Facet::Configured(EncryptionRule {
            algorithm: SseAlgorithm::AwsKms,
            kms_key_id: Some("alias/logs".to_string()),
            bucket_key_enabled: Some(true),
        }),
        public_access_block: Facet::Configured(PublicAccessBlockRule {
            block_public_acls: true,
            ignore_public_acls: true,
            block_public_policy: false,
            restrict_public_buckets: false,
        }),
        lifecycle_rules: Facet::Configured(vec![LifecycleRule {
            id: Some("expire-tmp".to_string()),
            enabled: true,
            prefix: Some("tmp/".to_string()),
            expiration_days: Some(7),
            noncurrent_version_expiration_days: None,
            abort_incomplete_multipart_days: Some(1),
            transitions: Vec::new(),
        }]),
        cors_rules: Facet::Configured(vec![CorsRule {
            id: None,
            allowed_methods: vec!["GET".to_string()],
            allowed_origins: vec!["https://example.com".to_string()],
            allowed_headers: Vec::new(),
            expose_headers: vec!["ETag".to_string()],
            max_age_seconds: Some(3600),
        }]),
    }
}

/// Seed `name` with `objects` as `(key, body)` pairs.
pub fn seed_bucket_with_objects(
    provider: &MemoryStorageProvider,
    name: &str,
    settings: BucketSettingsSnapshot,
    objects: &[(&str, &str)],
) {
    provider.seed_bucket(name, settings);
    for (key, body) in objects {
        provider.seed_object(name, key, body.to_string());
    }
}

pub fn request(names: &[&str], copy_data: bool) -> MigrationRequest {
    let mut tags = Tags::new();
    tags.insert("migrated-by".to_string(), "rebucket".to_string());
    MigrationRequest {
        sources: names.iter().map(|n| SourceName::from(*n)).collect(),
        copy_data,
        plan_only: false,
        region: "us-east-1".to_string(),
        tags,
        facets: FacetSelection::default(),
    }
}

/// Config with short waits so retry paths run quickly.
pub fn fast_config() -> MigrationConfig {
    MigrationConfig {
        copy_backoff: Duration::from_millis(5),
        consistency: ConsistencyConfig {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            timeout: Duration::from_secs(2),
        },
        ..Default::default()
    }
}

pub fn migrator(provider: &MemoryStorageProvider) -> Migrator {
    Migrator::new(Arc::new(provider.clone()), fast_config())
}

pub async fn run(provider: &MemoryStorageProvider, request: &MigrationRequest) -> MigrationReport {
    migrator(provider)
        .migrate(&NamingPolicy::default(), request)
        .await
        .unwrap()
}

/// A memory provider with hooks into a running migration.
///
/// - versioning reads can be slowed down, and the number in flight at once
///   is recorded
/// - writing tags to one bucket can raise a stop signal
/// - a failed object copy can revoke access to its source bucket
#[derive(Debug, Default)]
pub struct ObservedProvider {
    pub inner: MemoryStorageProvider,
    read_delay: Duration,
    reading: Arc<AtomicUsize>,
    peak_reading: Arc<AtomicUsize>,
    stop_on_tags: Option<(String, watch::Sender<bool>)>,
    revoke_on_copy_failure: bool,
}

impl ObservedProvider {
    pub fn new(inner: MemoryStorageProvider) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Send `true` on `signal` once tags are written to `bucket`.
    pub fn stop_after_tagging(mut self, bucket: &str, signal: watch::Sender<bool>) -> Self {
        self.stop_on_tags = Some((bucket.to_string(), signal));
        self
    }

    pub fn revoke_source_on_copy_failure(mut self) -> Self {
        self.revoke_on_copy_failure = true;
        self
    }

    /// Most versioning reads that were in flight at the same time.
    pub fn peak_reading(&self) -> usize {
        self.peak_reading.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageProvider for ObservedProvider {
    fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    fn locator(&self, bucket: &str) -> String {
        self.inner.locator(bucket)
    }

    async fn verify_identity(&self) -> Result<Identity, ProviderError> {
        self.inner.verify_identity().await
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ProviderError> {
        self.inner.bucket_exists(bucket).await
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), ProviderError> {
        self.inner.create_bucket(bucket, region).await
    }

    async fn get_versioning(&self, bucket: &str) -> Result<VersioningStatus, ProviderError> {
        let reading = self.reading.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_reading.fetch_max(reading, Ordering::SeqCst);
        tokio::time::sleep(self.read_delay).await;
        self.reading.fetch_sub(1, Ordering::SeqCst);
        self.inner.get_versioning(bucket).await
    }

    async fn put_versioning(
        &self,
        bucket: &str,
        status: VersioningStatus,
    ) -> Result<(), ProviderError> {
        self.inner.put_versioning(bucket, status).await
    }

    async fn get_encryption(&self, bucket: &str) -> Result<EncryptionRule, ProviderError> {
        self.inner.get_encryption(bucket).await
    }

    async fn put_encryption(
        &self,
        bucket: &str,
        rule: &EncryptionRule,
    ) -> Result<(), ProviderError> {
        self.inner.put_encryption(bucket, rule).await
    }

    async fn delete_encryption(&self, bucket: &str) -> Result<(), ProviderError> {
        self.inner.delete_encryption(bucket).await
    }

    async fn get_public_access_block(
        &self,
        bucket: &str,
    ) -> Result<PublicAccessBlockRule, ProviderError> {
        self.inner.get_public_access_block(bucket).await
    }

    async fn put_public_access_block(
        &self,
        bucket: &str,
        rule: &PublicAccessBlockRule,
    ) -> Result<(), ProviderError> {
        self.inner.put_public_access_block(bucket, rule).await
    }

    async fn get_lifecycle(&self, bucket: &str) -> Result<Vec<LifecycleRule>, ProviderError> {
        self.inner.get_lifecycle(bucket).await
    }

    async fn put_lifecycle(
        &self,
        bucket: &str,
        rules: &[LifecycleRule],
    ) -> Result<(), ProviderError> {
        self.inner.put_lifecycle(bucket, rules).await
    }

    async fn delete_lifecycle(&self, bucket: &str) -> Result<(), ProviderError> {
        self.inner.delete_lifecycle(bucket).await
    }

    async fn get_cors(&self, bucket: &str) -> Result<Vec<CorsRule>, ProviderError> {
        self.inner.get_cors(bucket).await
    }

    async fn put_cors(&self, bucket: &str, rules: &[CorsRule]) -> Result<(), ProviderError> {
        self.inner.put_cors(bucket, rules).await
    }

    async fn delete_cors(&self, bucket: &str) -> Result<(), ProviderError> {
        self.inner.delete_cors(bucket).await
    }

    async fn get_tags(&self, bucket: &str) -> Result<Tags, ProviderError> {
        self.inner.get_tags(bucket).await
    }

    async fn put_tags(&self, bucket: &str, tags: &Tags) -> Result<(), ProviderError> {
        self.inner.put_tags(bucket, tags).await?;
        if let Some((watched, signal)) = &self.stop_on_tags {
            if watched == bucket {
                signal.send_replace(true);
            }
        }
        Ok(())
    }

    async fn probe_objects(&self, bucket: &str) -> Result<(), ProviderError> {
        self.inner.probe_objects(bucket).await
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>, ProviderError> {
        self.inner.list_objects(bucket).await
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        key: &str,
        target_bucket: &str,
        size: u64,
    ) -> Result<(), ProviderError> {
        let result = self
            .inner
            .copy_object(source_bucket, key, target_bucket, size)
            .await;
        if result.is_err() && self.revoke_on_copy_failure {
            self.inner.deny_access(source_bucket);
        }
        result
    }
}
