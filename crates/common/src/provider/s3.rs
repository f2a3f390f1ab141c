use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{
    AbortIncompleteMultipartUpload, BucketLifecycleConfiguration, BucketLocationConstraint,
    BucketVersioningStatus, CompletedMultipartUpload, CompletedPart, CorsConfiguration, CreateBucketConfiguration, ExpirationStatus,
    LifecycleExpiration, LifecycleRuleFilter, NoncurrentVersionExpiration,
    PublicAccessBlockConfiguration, ServerSideEncryption, ServerSideEncryptionByDefault,
    ServerSideEncryptionConfiguration, ServerSideEncryptionRule, Tag, Tagging, Transition,
    TransitionStorageClass, VersioningConfiguration,
};
use aws_sdk_s3::Client;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Identity, ObjectSummary, ProviderError, StorageProvider, Tags};
use crate::settings::{
    CorsRule, EncryptionRule, LifecycleRule, LifecycleTransition, PublicAccessBlockRule,
    SseAlgorithm, VersioningStatus,
};

/// Error codes S3 uses to say a facet has never been set.
const NOT_CONFIGURED_CODES: &[&str] = &[
    "ServerSideEncryptionConfigurationNotFoundError",
    "NoSuchPublicAccessBlockConfiguration",
    "NoSuchLifecycleConfiguration",
    "NoSuchCORSConfiguration",
    "NoSuchTagSet",
];

const NOT_FOUND_CODES: &[&str] = &["NoSuchBucket", "NotFound"];

const ACCESS_DENIED_CODES: &[&str] = &["AccessDenied", "Forbidden", "AllAccessDisabled"];

/// Largest object a single `CopyObject` accepts.
const MAX_SINGLE_COPY_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Range size for multipart copies.
const COPY_PART_BYTES: u64 = 512 * 1024 * 1024;

const MAX_PARTS: u64 = 10_000;

/// Region S3 rejects as an explicit location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for an S3 or S3-compatible endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3ProviderConfig {
    /// Region the client signs requests for
    pub region: String,
    /// Custom endpoint, for S3-compatible services
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Named profile from the shared AWS config files
    #[serde(default)]
    pub profile: Option<String>,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    #[serde(default)]
    pub force_path_style: bool,
}

/// Storage provider backed by the AWS S3 API.
#[derive(Debug, Clone)]
pub struct S3StorageProvider {
    client: Client,
    region: String,
}

impl S3StorageProvider {
    /// Load credentials from the default chain and build a client.
    pub async fn new(config: &S3ProviderConfig) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        tracing::debug!(
            region = %config.region,
            endpoint = ?config.endpoint,
            "built S3 client"
        );

        Self {
            client: Client::from_conf(s3_config),
            region: config.region.clone(),
        }
    }
}

/// Map an SDK failure onto the provider error vocabulary.
fn classify<E>(operation: &'static str, bucket: &str, err: SdkError<E>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let code = err.code().map(str::to_string);
    let status = err.raw_response().map(|r| r.status().as_u16());
    let detail = DisplayErrorContext(&err).to_string();

    match code.as_deref() {
        Some(c) if NOT_CONFIGURED_CODES.contains(&c) => ProviderError::NotConfigured,
        Some(c) if NOT_FOUND_CODES.contains(&c) => {
            ProviderError::BucketNotFound(bucket.to_string())
        }
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => ProviderError::AccessDenied {
            bucket: bucket.to_string(),
            detail,
        },
        _ => match status {
            Some(404) => ProviderError::BucketNotFound(bucket.to_string()),
            Some(403) => ProviderError::AccessDenied {
                bucket: bucket.to_string(),
                detail,
            },
            _ => ProviderError::Request {
                operation,
                code,
                detail,
            },
        },
    }
}

fn invalid(what: &'static str, err: BuildError) -> ProviderError {
    ProviderError::Invalid {
        what,
        detail: err.to_string(),
    }
}

fn lifecycle_from_s3(rule: &aws_sdk_s3::types::LifecycleRule) -> LifecycleRule {
    #[allow(deprecated)]
    let prefix = rule
        .filter()
        .and_then(LifecycleRuleFilter::prefix)
        .or(rule.prefix())
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    LifecycleRule {
        id: rule.id().map(str::to_string),
        enabled: *rule.status() == ExpirationStatus::Enabled,
        prefix,
        expiration_days: rule.expiration().and_then(|e| e.days()),
        noncurrent_version_expiration_days: rule
            .noncurrent_version_expiration()
            .and_then(|e| e.noncurrent_days()),
        abort_incomplete_multipart_days: rule
            .abort_incomplete_multipart_upload()
            .and_then(|a| a.days_after_initiation()),
        transitions: rule
            .transitions()
            .iter()
            .map(|t| LifecycleTransition {
                days: t.days(),
                storage_class: t
                    .storage_class()
                    .map(|c| c.as_str().to_string())
                    .unwrap_or_default(),
            })
            .collect(),
    }
}

fn lifecycle_to_s3(rule: &LifecycleRule) -> Result<aws_sdk_s3::types::LifecycleRule, ProviderError> {
    let status = if rule.enabled {
        ExpirationStatus::Enabled
    } else {
        ExpirationStatus::Disabled
    };
    let filter = LifecycleRuleFilter::builder()
        .prefix(rule.prefix.clone().unwrap_or_default())
        .build();

    aws_sdk_s3::types::LifecycleRule::builder()
        .set_id(rule.id.clone())
        .status(status)
        .filter(filter)
        .set_expiration(
            rule.expiration_days
                .map(|days| LifecycleExpiration::builder().days(days).build()),
        )
        .set_noncurrent_version_expiration(rule.noncurrent_version_expiration_days.map(|days| {
            NoncurrentVersionExpiration::builder()
                .noncurrent_days(days)
                .build()
        }))
        .set_abort_incomplete_multipart_upload(rule.abort_incomplete_multipart_days.map(|days| {
            AbortIncompleteMultipartUpload::builder()
                .days_after_initiation(days)
                .build()
        }))
        .set_transitions(Some(
            rule.transitions
                .iter()
                .map(|t| {
                    Transition::builder()
                        .set_days(t.days)
                        .storage_class(TransitionStorageClass::from(t.storage_class.as_str()))
                        .build()
                })
                .collect(),
        ))
        .build()
        .map_err(|e| invalid("lifecycle rule", e))
}

fn cors_from_s3(rule: &aws_sdk_s3::types::CorsRule) -> CorsRule {
    CorsRule {
        id: rule.id().map(str::to_string),
        allowed_methods: rule.allowed_methods().to_vec(),
        allowed_origins: rule.allowed_origins().to_vec(),
        allowed_headers: rule.allowed_headers().to_vec(),
        expose_headers: rule.expose_headers().to_vec(),
        max_age_seconds: rule.max_age_seconds(),
    }
}

fn cors_to_s3(rule: &CorsRule) -> Result<aws_sdk_s3::types::CorsRule, ProviderError> {
    aws_sdk_s3::types::CorsRule::builder()
        .set_id(rule.id.clone())
        .set_allowed_methods(Some(rule.allowed_methods.clone()))
        .set_allowed_origins(Some(rule.allowed_origins.clone()))
        .set_allowed_headers(Some(rule.allowed_headers.clone()))
        .set_expose_headers(Some(rule.expose_headers.clone()))
        .set_max_age_seconds(rule.max_age_seconds)
        .build()
        .map_err(|e| invalid("cors rule", e))
}

#[async_trait]
impl StorageProvider for S3StorageProvider {
    fn kind(&self) -> &'static str {
        "s3"
    }

    fn locator(&self, bucket: &str) -> String {
        format!("arn:aws:s3:::{}", bucket)
    }

    async fn verify_identity(&self) -> Result<Identity, ProviderError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify("list_buckets", "*", e))?;
        let principal = output
            .owner()
            .and_then(|o| o.display_name().or(o.id()))
            .unwrap_or("unknown")
            .to_string();
        Ok(Identity {
            provider: self.kind(),
            principal,
            region: Some(self.region.clone()),
        })
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ProviderError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => match classify("head_bucket", bucket, e) {
                ProviderError::BucketNotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), ProviderError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        match request.send().await {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BucketAlreadyOwnedByYou") => Ok(()),
            Err(e) => Err(classify("create_bucket", bucket, e)),
        }
    }

    async fn get_versioning(&self, bucket: &str) -> Result<VersioningStatus, ProviderError> {
        let output = self
            .client
            .get_bucket_versioning()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("get_bucket_versioning", bucket, e))?;
        // a bucket that never had versioning reports no status at all
        match output.status() {
            Some(BucketVersioningStatus::Enabled) => Ok(VersioningStatus::Enabled),
            Some(BucketVersioningStatus::Suspended) => Ok(VersioningStatus::Suspended),
            _ => Err(ProviderError::NotConfigured),
        }
    }

    async fn put_versioning(
        &self,
        bucket: &str,
        status: VersioningStatus,
    ) -> Result<(), ProviderError> {
        let status = match status {
            VersioningStatus::Enabled => BucketVersioningStatus::Enabled,
            VersioningStatus::Suspended => BucketVersioningStatus::Suspended,
        };
        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(VersioningConfiguration::builder().status(status).build())
            .send()
            .await
            .map_err(|e| classify("put_bucket_versioning", bucket, e))?;
        Ok(())
    }

    async fn get_encryption(&self, bucket: &str) -> Result<EncryptionRule, ProviderError> {
        let output = self
            .client
            .get_bucket_encryption()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("get_bucket_encryption", bucket, e))?;

        let rule = output
            .server_side_encryption_configuration()
            .and_then(|c| c.rules().first())
            .ok_or(ProviderError::NotConfigured)?;
        let default = rule
            .apply_server_side_encryption_by_default()
            .ok_or(ProviderError::NotConfigured)?;
        let raw = default.sse_algorithm().as_str();
        let algorithm = SseAlgorithm::parse(raw).ok_or_else(|| ProviderError::Invalid {
            what: "encryption algorithm",
            detail: raw.to_string(),
        })?;

        Ok(EncryptionRule {
            algorithm,
            kms_key_id: default.kms_master_key_id().map(str::to_string),
            bucket_key_enabled: rule.bucket_key_enabled(),
        })
    }

    async fn put_encryption(
        &self,
        bucket: &str,
        rule: &EncryptionRule,
    ) -> Result<(), ProviderError> {
        let default = ServerSideEncryptionByDefault::builder()
            .sse_algorithm(ServerSideEncryption::from(rule.algorithm.as_str()))
            .set_kms_master_key_id(rule.kms_key_id.clone())
            .build()
            .map_err(|e| invalid("encryption rule", e))?;
        let configuration = ServerSideEncryptionConfiguration::builder()
            .rules(
                ServerSideEncryptionRule::builder()
                    .apply_server_side_encryption_by_default(default)
                    .set_bucket_key_enabled(rule.bucket_key_enabled)
                    .build(),
            )
            .build()
            .map_err(|e| invalid("encryption rule", e))?;

        self.client
            .put_bucket_encryption()
            .bucket(bucket)
            .server_side_encryption_configuration(configuration)
            .send()
            .await
            .map_err(|e| classify("put_bucket_encryption", bucket, e))?;
        Ok(())
    }

    async fn delete_encryption(&self, bucket: &str) -> Result<(), ProviderError> {
        self.client
            .delete_bucket_encryption()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("delete_bucket_encryption", bucket, e))?;
        Ok(())
    }

    async fn get_public_access_block(
        &self,
        bucket: &str,
    ) -> Result<PublicAccessBlockRule, ProviderError> {
        let output = self
            .client
            .get_public_access_block()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("get_public_access_block", bucket, e))?;
        let config = output
            .public_access_block_configuration()
            .ok_or(ProviderError::NotConfigured)?;
        Ok(PublicAccessBlockRule {
            block_public_acls: config.block_public_acls().unwrap_or(false),
            ignore_public_acls: config.ignore_public_acls().unwrap_or(false),
            block_public_policy: config.block_public_policy().unwrap_or(false),
            restrict_public_buckets: config.restrict_public_buckets().unwrap_or(false),
        })
    }

    async fn put_public_access_block(
        &self,
        bucket: &str,
        rule: &PublicAccessBlockRule,
    ) -> Result<(), ProviderError> {
        self.client
            .put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(
                PublicAccessBlockConfiguration::builder()
                    .block_public_acls(rule.block_public_acls)
                    .ignore_public_acls(rule.ignore_public_acls)
                    .block_public_policy(rule.block_public_policy)
                    .restrict_public_buckets(rule.restrict_public_buckets)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| classify("put_public_access_block", bucket, e))?;
        Ok(())
    }

    async fn get_lifecycle(&self, bucket: &str) -> Result<Vec<LifecycleRule>, ProviderError> {
        let output = self
            .client
            .get_bucket_lifecycle_configuration()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("get_bucket_lifecycle_configuration", bucket, e))?;
        Ok(output.rules().iter().map(lifecycle_from_s3).collect())
    }

    async fn put_lifecycle(
        &self,
        bucket: &str,
        rules: &[LifecycleRule],
    ) -> Result<(), ProviderError> {
        // S3 refuses an empty configuration; no rules means no configuration
        if rules.is_empty() {
            return self.delete_lifecycle(bucket).await;
        }
        let rules = rules
            .iter()
            .map(lifecycle_to_s3)
            .collect::<Result<Vec<_>, _>>()?;
        let configuration = BucketLifecycleConfiguration::builder()
            .set_rules(Some(rules))
            .build()
            .map_err(|e| invalid("lifecycle configuration", e))?;

        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(bucket)
            .lifecycle_configuration(configuration)
            .send()
            .await
            .map_err(|e| classify("put_bucket_lifecycle_configuration", bucket, e))?;
        Ok(())
    }

    async fn delete_lifecycle(&self, bucket: &str) -> Result<(), ProviderError> {
        self.client
            .delete_bucket_lifecycle()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("delete_bucket_lifecycle", bucket, e))?;
        Ok(())
    }

    async fn get_cors(&self, bucket: &str) -> Result<Vec<CorsRule>, ProviderError> {
        let output = self
            .client
            .get_bucket_cors()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("get_bucket_cors", bucket, e))?;
        Ok(output.cors_rules().iter().map(cors_from_s3).collect())
    }

    async fn put_cors(&self, bucket: &str, rules: &[CorsRule]) -> Result<(), ProviderError> {
        if rules.is_empty() {
            return self.delete_cors(bucket).await;
        }
        let rules = rules
            .iter()
            .map(cors_to_s3)
            .collect::<Result<Vec<_>, _>>()?;
        let configuration = CorsConfiguration::builder()
            .set_cors_rules(Some(rules))
            .build()
            .map_err(|e| invalid("cors configuration", e))?;

        self.client
            .put_bucket_cors()
            .bucket(bucket)
            .cors_configuration(configuration)
            .send()
            .await
            .map_err(|e| classify("put_bucket_cors", bucket, e))?;
        Ok(())
    }

    async fn delete_cors(&self, bucket: &str) -> Result<(), ProviderError> {
        self.client
            .delete_bucket_cors()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("delete_bucket_cors", bucket, e))?;
        Ok(())
    }

    async fn get_tags(&self, bucket: &str) -> Result<Tags, ProviderError> {
        let output = self
            .client
            .get_bucket_tagging()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("get_bucket_tagging", bucket, e))?;
        Ok(output
            .tag_set()
            .iter()
            .map(|t| (t.key().to_string(), t.value().to_string()))
            .collect())
    }

    async fn put_tags(&self, bucket: &str, tags: &Tags) -> Result<(), ProviderError> {
        if tags.is_empty() {
            self.client
                .delete_bucket_tagging()
                .bucket(bucket)
                .send()
                .await
                .map_err(|e| classify("delete_bucket_tagging", bucket, e))?;
            return Ok(());
        }
        let tag_set = tags
            .iter()
            .map(|(k, v)| {
                Tag::builder()
                    .key(k)
                    .value(v)
                    .build()
                    .map_err(|e| invalid("tag", e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| invalid("tag set", e))?;

        self.client
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| classify("put_bucket_tagging", bucket, e))?;
        Ok(())
    }

    async fn probe_objects(&self, bucket: &str) -> Result<(), ProviderError> {
        self.client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| classify("list_objects_v2", bucket, e))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>, ProviderError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| classify("list_objects_v2", bucket, e))?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    etag: object.e_tag().map(str::to_string),
                });
            }
        }
        Ok(objects)
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        key: &str,
        target_bucket: &str,
        size: u64,
    ) -> Result<(), ProviderError> {
        if size > MAX_SINGLE_COPY_BYTES {
            return self
                .multipart_copy(source_bucket, key, target_bucket, size)
                .await;
        }

        match self
            .client
            .copy_object()
            .bucket(target_bucket)
            .key(key)
            .copy_source(format!("{}/{}", source_bucket, key))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("NoSuchKey") => Err(ProviderError::ObjectNotFound {
                bucket: source_bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(classify("copy_object", target_bucket, e)),
        }
    }
}

impl S3StorageProvider {
    /// Server-side copy in byte ranges, for objects `CopyObject` refuses.
    async fn multipart_copy(
        &self,
        source_bucket: &str,
        key: &str,
        target_bucket: &str,
        size: u64,
    ) -> Result<(), ProviderError> {
        let upload = self
            .client
            .create_multipart_upload()
            .bucket(target_bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("create_multipart_upload", target_bucket, e))?;
        let upload_id = upload.upload_id().ok_or_else(|| ProviderError::Request {
            operation: "create_multipart_upload",
            code: None,
            detail: "response carried no upload id".to_string(),
        })?;

        let ranges = part_ranges(size, COPY_PART_BYTES);
        tracing::debug!(
            source_bucket,
            target_bucket,
            key,
            size,
            parts = ranges.len(),
            "multipart copy"
        );

        match self
            .copy_parts(source_bucket, key, target_bucket, upload_id, &ranges)
            .await
        {
            Ok(parts) => self
                .client
                .complete_multipart_upload()
                .bucket(target_bucket)
                .key(key)
                .upload_id(upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map(|_| ())
                .map_err(|e| classify("complete_multipart_upload", target_bucket, e)),
            Err(e) => {
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(target_bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        target_bucket,
                        key,
                        upload_id,
                        error = %DisplayErrorContext(&abort),
                        "failed to abort multipart copy"
                    );
                }
                Err(e)
            }
        }
    }

    async fn copy_parts(
        &self,
        source_bucket: &str,
        key: &str,
        target_bucket: &str,
        upload_id: &str,
        ranges: &[(i32, String)],
    ) -> Result<Vec<CompletedPart>, ProviderError> {
        let mut parts = Vec::with_capacity(ranges.len());
        for (part_number, range) in ranges {
            let response = match self
                .client
                .upload_part_copy()
                .bucket(target_bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(*part_number)
                .copy_source(format!("{}/{}", source_bucket, key))
                .copy_source_range(range)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if e.code() == Some("NoSuchKey") => {
                    return Err(ProviderError::ObjectNotFound {
                        bucket: source_bucket.to_string(),
                        key: key.to_string(),
                    })
                }
                Err(e) => return Err(classify("upload_part_copy", target_bucket, e)),
            };
            let etag = response
                .copy_part_result()
                .and_then(|r| r.e_tag())
                .unwrap_or_default();
            parts.push(
                CompletedPart::builder()
                    .part_number(*part_number)
                    .e_tag(etag)
                    .build(),
            );
        }
        Ok(parts)
    }
}

/// Numbered `bytes=first-last` ranges covering `size` bytes. The part size
/// grows when needed to stay within the part-count limit.
fn part_ranges(size: u64, part_size: u64) -> Vec<(i32, String)> {
    let part_size = part_size.max(size.div_ceil(MAX_PARTS)).max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut part_number = 1;
    while start < size {
        let end = (start + part_size).min(size) - 1;
        ranges.push((part_number, format!("bytes={}-{}", start, end)));
        start = end + 1;
        part_number += 1;
    }
    ranges
}
