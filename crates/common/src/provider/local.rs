use std::path::{Path, PathBuf};

use async_trait::async_trait;
use object_store::{ObjectStoreConfig, Storage};
use serde::{Deserialize, Serialize};

use super::{Identity, ObjectSummary, ProviderError, StorageProvider, Tags};
use crate::settings::{
    BucketSettingsSnapshot, CorsRule, EncryptionRule, Facet, LifecycleRule,
    PublicAccessBlockRule, VersioningStatus,
};

/// Directory under the root that holds bucket settings sidecars.
/// Bucket names cannot start with a dot, so it never collides with a bucket.
const SETTINGS_DIR: &str = ".rebucket";

/// Storage provider over a local directory tree
///
/// Every immediate subdirectory of the root is a bucket; object data is
/// read and written through [`Storage`]. Facets and tags are kept in a JSON
/// sidecar per bucket, and a bucket without a sidecar simply has every
/// facet absent.
#[derive(Debug, Clone)]
pub struct LocalStorageProvider {
    root: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LocalBucketRecord {
    #[serde(default)]
    settings: BucketSettingsSnapshot,
    #[serde(default)]
    tags: Tags,
}

impl LocalStorageProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn record_path(&self, bucket: &str) -> PathBuf {
        self.root.join(SETTINGS_DIR).join(format!("{}.json", bucket))
    }

    async fn ensure_exists(&self, bucket: &str) -> Result<(), ProviderError> {
        if self.bucket_exists(bucket).await? {
            Ok(())
        } else {
            Err(ProviderError::BucketNotFound(bucket.to_string()))
        }
    }

    async fn storage(&self, bucket: &str) -> Result<Storage, ProviderError> {
        self.ensure_exists(bucket).await?;
        Ok(Storage::new(ObjectStoreConfig::Local {
            path: self.bucket_dir(bucket),
        })
        .await?)
    }

    async fn load_record(&self, bucket: &str) -> Result<LocalBucketRecord, ProviderError> {
        self.ensure_exists(bucket).await?;
        match tokio::fs::read(self.record_path(bucket)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(LocalBucketRecord::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn store_record(
        &self,
        bucket: &str,
        record: &LocalBucketRecord,
    ) -> Result<(), ProviderError> {
        let path = self.record_path(bucket);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // write-then-rename so a crash never leaves a torn sidecar
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(record)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn update_settings<F>(&self, bucket: &str, update: F) -> Result<(), ProviderError>
    where
        F: FnOnce(&mut LocalBucketRecord) + Send,
    {
        let mut record = self.load_record(bucket).await?;
        update(&mut record);
        self.store_record(bucket, &record).await
    }
}

fn configured<T: Clone>(facet: &Facet<T>) -> Result<T, ProviderError> {
    facet.configured().cloned().ok_or(ProviderError::NotConfigured)
}

#[async_trait]
impl StorageProvider for LocalStorageProvider {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn locator(&self, bucket: &str) -> String {
        format!("file://{}", self.bucket_dir(bucket).display())
    }

    async fn verify_identity(&self) -> Result<Identity, ProviderError> {
        let metadata = tokio::fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(ProviderError::Invalid {
                what: "root",
                detail: format!("{} is not a directory", self.root.display()),
            });
        }
        if metadata.permissions().readonly() {
            return Err(ProviderError::Invalid {
                what: "root",
                detail: format!("{} is read-only", self.root.display()),
            });
        }
        Ok(Identity {
            provider: self.kind(),
            principal: self.root.display().to_string(),
            region: None,
        })
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ProviderError> {
        match tokio::fs::metadata(self.bucket_dir(bucket)).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(ProviderError::AccessDenied {
                    bucket: bucket.to_string(),
                    detail: e.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_bucket(&self, bucket: &str, _region: &str) -> Result<(), ProviderError> {
        tokio::fs::create_dir_all(self.bucket_dir(bucket)).await?;
        Ok(())
    }

    async fn get_versioning(&self, bucket: &str) -> Result<VersioningStatus, ProviderError> {
        configured(&self.load_record(bucket).await?.settings.versioning)
    }

    async fn put_versioning(
        &self,
        bucket: &str,
        status: VersioningStatus,
    ) -> Result<(), ProviderError> {
        self.update_settings(bucket, |r| {
            r.settings.versioning = Facet::Configured(status)
        })
        .await
    }

    async fn get_encryption(&self, bucket: &str) -> Result<EncryptionRule, ProviderError> {
        configured(&self.load_record(bucket).await?.settings.encryption)
    }

    async fn put_encryption(
        &self,
        bucket: &str,
        rule: &EncryptionRule,
    ) -> Result<(), ProviderError> {
        let rule = rule.clone();
        self.update_settings(bucket, |r| r.settings.encryption = Facet::Configured(rule))
            .await
    }

    async fn delete_encryption(&self, bucket: &str) -> Result<(), ProviderError> {
        self.update_settings(bucket, |r| r.settings.encryption = Facet::Absent)
            .await
    }

    async fn get_public_access_block(
        &self,
        bucket: &str,
    ) -> Result<PublicAccessBlockRule, ProviderError> {
        configured(&self.load_record(bucket).await?.settings.public_access_block)
    }

    async fn put_public_access_block(
        &self,
        bucket: &str,
        rule: &PublicAccessBlockRule,
    ) -> Result<(), ProviderError> {
        let rule = *rule;
        self.update_settings(bucket, |r| {
            r.settings.public_access_block = Facet::Configured(rule)
        })
        .await
    }

    async fn get_lifecycle(&self, bucket: &str) -> Result<Vec<LifecycleRule>, ProviderError> {
        configured(&self.load_record(bucket).await?.settings.lifecycle_rules)
    }

    async fn put_lifecycle(
        &self,
        bucket: &str,
        rules: &[LifecycleRule],
    ) -> Result<(), ProviderError> {
        let rules = rules.to_vec();
        self.update_settings(bucket, |r| {
            r.settings.lifecycle_rules = Facet::Configured(rules)
        })
        .await
    }

    async fn delete_lifecycle(&self, bucket: &str) -> Result<(), ProviderError> {
        self.update_settings(bucket, |r| r.settings.lifecycle_rules = Facet::Absent)
            .await
    }

    async fn get_cors(&self, bucket: &str) -> Result<Vec<CorsRule>, ProviderError> {
        configured(&self.load_record(bucket).await?.settings.cors_rules)
    }

    async fn put_cors(&self, bucket: &str, rules: &[CorsRule]) -> Result<(), ProviderError> {
        let rules = rules.to_vec();
        self.update_settings(bucket, |r| r.settings.cors_rules = Facet::Configured(rules))
            .await
    }

    async fn delete_cors(&self, bucket: &str) -> Result<(), ProviderError> {
        self.update_settings(bucket, |r| r.settings.cors_rules = Facet::Absent)
            .await
    }

    async fn get_tags(&self, bucket: &str) -> Result<Tags, ProviderError> {
        let tags = self.load_record(bucket).await?.tags;
        if tags.is_empty() {
            return Err(ProviderError::NotConfigured);
        }
        Ok(tags)
    }

    async fn put_tags(&self, bucket: &str, tags: &Tags) -> Result<(), ProviderError> {
        let tags = tags.clone();
        self.update_settings(bucket, |r| r.tags = tags).await
    }

    async fn probe_objects(&self, bucket: &str) -> Result<(), ProviderError> {
        self.storage(bucket).await?.probe().await?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>, ProviderError> {
        let entries = self.storage(bucket).await?.list().await?;
        Ok(entries
            .into_iter()
            .map(|entry| ObjectSummary {
                key: entry.key,
                size: entry.size,
                etag: entry.e_tag,
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
        let source = self.storage(source_bucket).await?;
        let target = self.storage(target_bucket).await?;
        source.copy_to(key, &target).await.map_err(|e| match e {
            object_store::StoreError::NotFound(key) => ProviderError::ObjectNotFound {
                bucket: source_bucket.to_string(),
                key,
            },
            other => other.into(),
        })?;
        Ok(())
    }
}
