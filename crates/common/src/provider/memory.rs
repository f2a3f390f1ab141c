use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use super::{Identity, ObjectSummary, ProviderError, StorageProvider, Tags};
use crate::settings::{
    BucketSettingsSnapshot, CorsRule, EncryptionRule, Facet, FacetKind, LifecycleRule,
    PublicAccessBlockRule, VersioningStatus,
};

/// In-memory storage provider
///
/// Buckets, their facets and their objects live in process memory. Besides
/// serving tests, it can simulate the failure modes a real provider shows:
/// access denial, eventual consistency after creation, facet write failures
/// and transfers that break partway through.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageProvider {
    inner: Arc<RwLock<MemoryStorageProviderInner>>,
}

#[derive(Debug, Default)]
struct MemoryStorageProviderInner {
    buckets: BTreeMap<String, MemoryBucket>,
    /// Number of state-changing calls that succeeded
    mutations: u64,
    faults: Faults,
}

#[derive(Debug, Default)]
struct MemoryBucket {
    settings: BucketSettingsSnapshot,
    tags: Tags,
    objects: BTreeMap<String, StoredObject>,
    /// Existence checks that still report "missing" after creation
    hidden_checks: u32,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
}

impl StoredObject {
    fn new(data: Bytes) -> Self {
        let etag = blake3::hash(&data).to_hex().to_string();
        Self { data, etag }
    }
}

#[derive(Debug, Default)]
struct Faults {
    denied: HashSet<String>,
    /// bucket -> existence checks to hide it for once it is created
    hidden_after_create: HashMap<String, u32>,
    /// source bucket -> copies allowed before the next one fails
    copy_budget: HashMap<String, usize>,
    failing_writes: HashSet<(String, FacetKind)>,
}

impl MemoryStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStorageProviderInner>, ProviderError> {
        self.inner.read().map_err(|e| ProviderError::Request {
            operation: "lock",
            code: None,
            detail: format!("failed to acquire read lock: {}", e),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStorageProviderInner>, ProviderError> {
        self.inner.write().map_err(|e| ProviderError::Request {
            operation: "lock",
            code: None,
            detail: format!("failed to acquire write lock: {}", e),
        })
    }

    // Fixtures

    /// Create a bucket with the given facets, bypassing every fault.
    pub fn seed_bucket(&self, name: &str, settings: BucketSettingsSnapshot) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.buckets.insert(
            name.to_string(),
            MemoryBucket {
                settings,
                ..Default::default()
            },
        );
    }

    /// Store an object, creating nothing: the bucket must exist.
    pub fn seed_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let bucket = inner
            .buckets
            .get_mut(bucket)
            .unwrap_or_else(|| panic!("seed_object: bucket '{}' does not exist", bucket));
        bucket
            .objects
            .insert(key.to_string(), StoredObject::new(data.into()));
    }

    // Fault injection

    /// Every call touching `bucket` fails with access denied.
    pub fn deny_access(&self, bucket: &str) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.faults.denied.insert(bucket.to_string());
    }

    /// After `bucket` is created, its first `checks` existence checks report
    /// it missing and every other call on it fails with not found.
    pub fn hide_after_create(&self, bucket: &str, checks: u32) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .faults
            .hidden_after_create
            .insert(bucket.to_string(), checks);
    }

    /// Allow `copies` object copies out of `source_bucket`, then fail the
    /// next one. The fault clears once it fires.
    pub fn fail_copy_after(&self, source_bucket: &str, copies: usize) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .faults
            .copy_budget
            .insert(source_bucket.to_string(), copies);
    }

    /// Every write of `facet` to `bucket` fails.
    pub fn fail_facet_writes(&self, bucket: &str, facet: FacetKind) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .faults
            .failing_writes
            .insert((bucket.to_string(), facet));
    }

    // Inspection

    pub fn has_bucket(&self, bucket: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.buckets.contains_key(bucket)
    }

    /// Facets currently stored on a bucket.
    pub fn settings(&self, bucket: &str) -> Option<BucketSettingsSnapshot> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.buckets.get(bucket).map(|b| b.settings.clone())
    }

    pub fn tags(&self, bucket: &str) -> Option<Tags> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.buckets.get(bucket).map(|b| b.tags.clone())
    }

    /// Object contents by key.
    pub fn objects(&self, bucket: &str) -> BTreeMap<String, Bytes> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .buckets
            .get(bucket)
            .map(|b| {
                b.objects
                    .iter()
                    .map(|(k, o)| (k.clone(), o.data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Count of successful state-changing calls so far.
    pub fn mutations(&self) -> u64 {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.mutations
    }
}

impl MemoryStorageProviderInner {
    fn check_access(&self, bucket: &str) -> Result<(), ProviderError> {
        if self.faults.denied.contains(bucket) {
            return Err(ProviderError::AccessDenied {
                bucket: bucket.to_string(),
                detail: "simulated permission denial".to_string(),
            });
        }
        Ok(())
    }

    fn bucket(&self, bucket: &str) -> Result<&MemoryBucket, ProviderError> {
        self.check_access(bucket)?;
        match self.buckets.get(bucket) {
            Some(b) if b.hidden_checks == 0 => Ok(b),
            _ => Err(ProviderError::BucketNotFound(bucket.to_string())),
        }
    }

    fn bucket_mut(
        &mut self,
        bucket: &str,
        facet: Option<FacetKind>,
    ) -> Result<&mut MemoryBucket, ProviderError> {
        self.check_access(bucket)?;
        if let Some(facet) = facet {
            if self
                .faults
                .failing_writes
                .contains(&(bucket.to_string(), facet))
            {
                return Err(ProviderError::Request {
                    operation: "put",
                    code: Some("InternalError".to_string()),
                    detail: format!("simulated {} write failure", facet),
                });
            }
        }
        let found = self
            .buckets
            .get_mut(bucket)
            .filter(|b| b.hidden_checks == 0)
            .ok_or_else(|| ProviderError::BucketNotFound(bucket.to_string()))?;
        self.mutations += 1;
        Ok(found)
    }
}

fn configured<T: Clone>(facet: &Facet<T>) -> Result<T, ProviderError> {
    facet.configured().cloned().ok_or(ProviderError::NotConfigured)
}

#[async_trait]
impl StorageProvider for MemoryStorageProvider {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn locator(&self, bucket: &str) -> String {
        format!("memory://{}", bucket)
    }

    async fn verify_identity(&self) -> Result<Identity, ProviderError> {
        Ok(Identity {
            provider: self.kind(),
            principal: "memory".to_string(),
            region: None,
        })
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ProviderError> {
        let mut inner = self.write()?;
        inner.check_access(bucket)?;
        match inner.buckets.get_mut(bucket) {
            Some(b) if b.hidden_checks > 0 => {
                b.hidden_checks -= 1;
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn create_bucket(&self, bucket: &str, _region: &str) -> Result<(), ProviderError> {
        let mut inner = self.write()?;
        inner.check_access(bucket)?;
        if inner.buckets.contains_key(bucket) {
            return Ok(());
        }
        let hidden_checks = inner
            .faults
            .hidden_after_create
            .remove(bucket)
            .unwrap_or(0);
        inner.buckets.insert(
            bucket.to_string(),
            MemoryBucket {
                hidden_checks,
                ..Default::default()
            },
        );
        inner.mutations += 1;
        Ok(())
    }

    async fn get_versioning(&self, bucket: &str) -> Result<VersioningStatus, ProviderError> {
        configured(&self.read()?.bucket(bucket)?.settings.versioning)
    }

    async fn put_versioning(
        &self,
        bucket: &str,
        status: VersioningStatus,
    ) -> Result<(), ProviderError> {
        let mut inner = self.write()?;
        inner
            .bucket_mut(bucket, Some(FacetKind::Versioning))?
            .settings
            .versioning = Facet::Configured(status);
        Ok(())
    }

    async fn get_encryption(&self, bucket: &str) -> Result<EncryptionRule, ProviderError> {
        configured(&self.read()?.bucket(bucket)?.settings.encryption)
    }

    async fn put_encryption(
        &self,
        bucket: &str,
        rule: &EncryptionRule,
    ) -> Result<(), ProviderError> {
        let mut inner = self.write()?;
        inner
            .bucket_mut(bucket, Some(FacetKind::Encryption))?
            .settings
            .encryption = Facet::Configured(rule.clone());
        Ok(())
    }

    async fn delete_encryption(&self, bucket: &str) -> Result<(), ProviderError> {
        let mut inner = self.write()?;
        inner
            .bucket_mut(bucket, Some(FacetKind::Encryption))?
            .settings
            .encryption = Facet::Absent;
        Ok(())
    }

    async fn get_public_access_block(
        &self,
        bucket: &str,
    ) -> Result<PublicAccessBlockRule, ProviderError> {
        configured(&self.read()?.bucket(bucket)?.settings.public_access_block)
    }

    async fn put_public_access_block(
        &self,
        bucket: &str,
        rule: &PublicAccessBlockRule,
    ) -> Result<(), ProviderError> {
        let mut inner = self.write()?;
        inner
            .bucket_mut(bucket, Some(FacetKind::PublicAccessBlock))?
            .settings
            .public_access_block = Facet::Configured(*rule);
        Ok(())
    }

    async fn get_lifecycle(&self, bucket: &str) -> Result<Vec<LifecycleRule>, ProviderError> {
        configured(&self.read()?.bucket(bucket)?.settings.lifecycle_rules)
    }

    async fn put_lifecycle(
        &self,
        bucket: &str,
        rules: &[LifecycleRule],
    ) -> Result<(), ProviderError> {
        let mut inner = self.write()?;
        inner
            .bucket_mut(bucket, Some(FacetKind::Lifecycle))?
            .settings
            .lifecycle_rules = Facet::Configured(rules.to_vec());
        Ok(())
    }

    async fn delete_lifecycle(&self, bucket: &str) -> Result<(), ProviderError> {
        let mut inner = self.write()?;
        inner
            .bucket_mut(bucket, Some(FacetKind::Lifecycle))?
            .settings
            .lifecycle_rules = Facet::Absent;
        Ok(())
    }

    async fn get_cors(&self, bucket: &str) -> Result<Vec<CorsRule>, ProviderError> {
        configured(&self.read()?.bucket(bucket)?.settings.cors_rules)
    }

    async fn put_cors(&self, bucket: &str, rules: &[CorsRule]) -> Result<(), ProviderError> {
        let mut inner = self.write()?;
        inner
            .bucket_mut(bucket, Some(FacetKind::Cors))?
            .settings
            .cors_rules = Facet::Configured(rules.to_vec());
        Ok(())
    }

    async fn delete_cors(&self, bucket: &str) -> Result<(), ProviderError> {
        let mut inner = self.write()?;
        inner
            .bucket_mut(bucket, Some(FacetKind::Cors))?
            .settings
            .cors_rules = Facet::Absent;
        Ok(())
    }

    async fn get_tags(&self, bucket: &str) -> Result<Tags, ProviderError> {
        let inner = self.read()?;
        let tags = &inner.bucket(bucket)?.tags;
        if tags.is_empty() {
            return Err(ProviderError::NotConfigured);
        }
        Ok(tags.clone())
    }

    async fn put_tags(&self, bucket: &str, tags: &Tags) -> Result<(), ProviderError> {
        let mut inner = self.write()?;
        inner.bucket_mut(bucket, Some(FacetKind::Tags))?.tags = tags.clone();
        Ok(())
    }

    async fn probe_objects(&self, bucket: &str) -> Result<(), ProviderError> {
        self.read()?.bucket(bucket)?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>, ProviderError> {
        let inner = self.read()?;
        Ok(inner
            .bucket(bucket)?
            .objects
            .iter()
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                size: object.data.len() as u64,
                etag: Some(object.etag.clone()),
            })
            .collect())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        key: &str,
        target_bucket: &str,
        _size: u64,
    ) -> Result<(), ProviderError> {
        let mut inner = self.write()?;

        if let Some(budget) = inner.faults.copy_budget.get_mut(source_bucket) {
            if *budget == 0 {
                inner.faults.copy_budget.remove(source_bucket);
                return Err(ProviderError::Request {
                    operation: "copy_object",
                    code: Some("SlowDown".to_string()),
                    detail: format!("simulated transfer failure at '{}'", key),
                });
            }
            *budget -= 1;
        }

        let object = inner
            .bucket(source_bucket)?
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| ProviderError::ObjectNotFound {
                bucket: source_bucket.to_string(),
                key: key.to_string(),
            })?;
        inner
            .bucket_mut(target_bucket, None)?
            .objects
            .insert(key.to_string(), object);
        Ok(())
    }
}
