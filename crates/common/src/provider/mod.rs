//! Storage provider capability interface
//!
//! The engine talks to object storage only through [`StorageProvider`]:
//! bucket existence and creation, per-facet get/set, object listing and
//! copy, and identity verification. Vendor SDK details stay behind the
//! implementations:
//!
//! - [`S3StorageProvider`]: AWS S3 and S3-compatible endpoints
//! - [`LocalStorageProvider`]: buckets as directories on a local filesystem
//! - [`MemoryStorageProvider`]: in-process buckets with fault injection
//!
//! A "facet not configured" answer is reported as
//! [`ProviderError::NotConfigured`], never folded into a default value, so
//! callers can tell an absent facet from an empty one.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::Serialize;

use crate::settings::{
    CorsRule, EncryptionRule, LifecycleRule, PublicAccessBlockRule, VersioningStatus,
};

mod local;
mod memory;
mod s3;

pub use local::LocalStorageProvider;
pub use memory::MemoryStorageProvider;
pub use s3::{S3ProviderConfig, S3StorageProvider};

/// Bucket tags, ordered by key.
pub type Tags = BTreeMap<String, String>;

/// Errors returned by storage providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The requested facet is not configured on the bucket
    #[error("not configured")]
    NotConfigured,
    #[error("bucket '{0}' not found")]
    BucketNotFound(String),
    #[error("access denied to bucket '{bucket}': {detail}")]
    AccessDenied { bucket: String, detail: String },
    #[error("object '{key}' not found in bucket '{bucket}'")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid {what}: {detail}")]
    Invalid { what: &'static str, detail: String },
    #[error("object storage error: {0}")]
    Store(#[from] object_store::StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Anything else the backend reported, with its error code if it had one
    #[error("{operation} failed{}: {detail}", .code.as_ref().map(|c| format!(" ({})", c)).unwrap_or_default())]
    Request {
        operation: &'static str,
        code: Option<String>,
        detail: String,
    },
}

impl ProviderError {
    /// The bucket cannot be reached at all, as opposed to a failed request.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ProviderError::BucketNotFound(_) | ProviderError::AccessDenied { .. }
        )
    }
}

/// The principal a provider session acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub provider: &'static str,
    pub principal: String,
    pub region: Option<String>,
}

/// Listing entry for one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
}

impl ObjectSummary {
    /// Whether `other` provably holds the same bytes.
    ///
    /// Missing entity tags never count as a match, so an object whose
    /// content cannot be compared is always transferred.
    pub fn same_content(&self, other: &ObjectSummary) -> bool {
        self.size == other.size
            && matches!((&self.etag, &other.etag), (Some(a), Some(b)) if a == b)
    }
}

/// Capabilities the migration engine needs from an object storage service.
///
/// One handle is shared by every per-bucket pipeline, so implementations
/// must accept concurrent calls and never keep per-call state on `self`.
#[async_trait]
pub trait StorageProvider: Send + Sync + Debug + 'static {
    /// Short provider name for reports and logs
    fn kind(&self) -> &'static str;

    /// Fully-qualified locator for a bucket (ARN, URL, path)
    fn locator(&self, bucket: &str) -> String;

    /// Check the configured credentials and report who we are
    async fn verify_identity(&self) -> Result<Identity, ProviderError>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ProviderError>;

    /// Create a bucket. Creating a bucket we already own succeeds.
    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), ProviderError>;

    async fn get_versioning(&self, bucket: &str) -> Result<VersioningStatus, ProviderError>;
    async fn put_versioning(
        &self,
        bucket: &str,
        status: VersioningStatus,
    ) -> Result<(), ProviderError>;

    async fn get_encryption(&self, bucket: &str) -> Result<EncryptionRule, ProviderError>;
    async fn put_encryption(&self, bucket: &str, rule: &EncryptionRule)
        -> Result<(), ProviderError>;
    async fn delete_encryption(&self, bucket: &str) -> Result<(), ProviderError>;

    async fn get_public_access_block(
        &self,
        bucket: &str,
    ) -> Result<PublicAccessBlockRule, ProviderError>;
    async fn put_public_access_block(
        &self,
        bucket: &str,
        rule: &PublicAccessBlockRule,
    ) -> Result<(), ProviderError>;

    async fn get_lifecycle(&self, bucket: &str) -> Result<Vec<LifecycleRule>, ProviderError>;
    async fn put_lifecycle(
        &self,
        bucket: &str,
        rules: &[LifecycleRule],
    ) -> Result<(), ProviderError>;
    async fn delete_lifecycle(&self, bucket: &str) -> Result<(), ProviderError>;

    async fn get_cors(&self, bucket: &str) -> Result<Vec<CorsRule>, ProviderError>;
    async fn put_cors(&self, bucket: &str, rules: &[CorsRule]) -> Result<(), ProviderError>;
    async fn delete_cors(&self, bucket: &str) -> Result<(), ProviderError>;

    async fn get_tags(&self, bucket: &str) -> Result<Tags, ProviderError>;
    async fn put_tags(&self, bucket: &str, tags: &Tags) -> Result<(), ProviderError>;

    /// Cheap readability check: list at most one object
    async fn probe_objects(&self, bucket: &str) -> Result<(), ProviderError>;

    /// Every object in the bucket, recursively
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>, ProviderError>;

    /// Copy one object to another bucket under the same key, overwriting.
    /// `size` is the listed size of the source object.
    async fn copy_object(
        &self,
        source_bucket: &str,
        key: &str,
        target_bucket: &str,
        size: u64,
    ) -> Result<(), ProviderError>;
}
