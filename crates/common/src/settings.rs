//! Bucket-level settings and the snapshot model
//!
//! A [`BucketSettingsSnapshot`] is a point-in-time read of every facet of one
//! bucket. Each facet is a [`Facet`]: either explicitly absent (the provider
//! reported it as not configured, so provider defaults apply) or configured
//! with a value. An absent lifecycle is not the same thing as a configured,
//! empty rule list.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One configurable policy dimension of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetKind {
    Versioning,
    Encryption,
    PublicAccessBlock,
    Lifecycle,
    Cors,
    Tags,
}

impl FacetKind {
    /// Order in which facets are applied to a target bucket.
    pub const APPLY_ORDER: [FacetKind; 5] = [
        FacetKind::Versioning,
        FacetKind::Encryption,
        FacetKind::PublicAccessBlock,
        FacetKind::Lifecycle,
        FacetKind::Cors,
    ];
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FacetKind::Versioning => "versioning",
            FacetKind::Encryption => "encryption",
            FacetKind::PublicAccessBlock => "public-access-block",
            FacetKind::Lifecycle => "lifecycle",
            FacetKind::Cors => "cors",
            FacetKind::Tags => "tags",
        };
        f.write_str(name)
    }
}

/// A facet value that may be explicitly unconfigured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Facet<T> {
    /// Not configured on the bucket; provider defaults apply
    Absent,
    Configured(T),
}

impl<T> Default for Facet<T> {
    fn default() -> Self {
        Facet::Absent
    }
}

impl<T> Facet<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Facet::Absent)
    }

    pub fn configured(&self) -> Option<&T> {
        match self {
            Facet::Absent => None,
            Facet::Configured(value) => Some(value),
        }
    }
}

impl<T> From<Option<T>> for Facet<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Facet::Configured(v),
            None => Facet::Absent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersioningStatus {
    Enabled,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SseAlgorithm {
    /// Provider-managed keys (SSE-S3)
    Aes256,
    /// KMS-managed keys (SSE-KMS)
    AwsKms,
    /// Dual-layer KMS (DSSE-KMS)
    AwsKmsDsse,
}

impl SseAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SseAlgorithm::Aes256 => "AES256",
            SseAlgorithm::AwsKms => "aws:kms",
            SseAlgorithm::AwsKmsDsse => "aws:kms:dsse",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "AES256" => Some(SseAlgorithm::Aes256),
            "aws:kms" => Some(SseAlgorithm::AwsKms),
            "aws:kms:dsse" => Some(SseAlgorithm::AwsKmsDsse),
            _ => None,
        }
    }
}

/// Default server-side encryption of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionRule {
    pub algorithm: SseAlgorithm,
    #[serde(default)]
    pub kms_key_id: Option<String>,
    #[serde(default)]
    pub bucket_key_enabled: Option<bool>,
}

/// The four public-access restriction flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAccessBlockRule {
    pub block_public_acls: bool,
    pub ignore_public_acls: bool,
    pub block_public_policy: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlockRule {
    /// Every restriction on. Applied when a source has no rule of its own.
    pub const fn locked_down() -> Self {
        Self {
            block_public_acls: true,
            ignore_public_acls: true,
            block_public_policy: true,
            restrict_public_buckets: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleTransition {
    pub days: Option<i32>,
    pub storage_class: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub id: Option<String>,
    pub enabled: bool,
    /// Key prefix the rule is scoped to; `None` applies to the whole bucket
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub expiration_days: Option<i32>,
    #[serde(default)]
    pub noncurrent_version_expiration_days: Option<i32>,
    #[serde(default)]
    pub abort_incomplete_multipart_days: Option<i32>,
    #[serde(default)]
    pub transitions: Vec<LifecycleTransition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsRule {
    #[serde(default)]
    pub id: Option<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    #[serde(default)]
    pub expose_headers: Vec<String>,
    #[serde(default)]
    pub max_age_seconds: Option<i32>,
}

/// Point-in-time read of every facet of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BucketSettingsSnapshot {
    pub versioning: Facet<VersioningStatus>,
    pub encryption: Facet<EncryptionRule>,
    pub public_access_block: Facet<PublicAccessBlockRule>,
    pub lifecycle_rules: Facet<Vec<LifecycleRule>>,
    pub cors_rules: Facet<Vec<CorsRule>>,
}

impl BucketSettingsSnapshot {
    pub fn versioning_enabled(&self) -> bool {
        matches!(self.versioning, Facet::Configured(VersioningStatus::Enabled))
    }

    /// Facets with a configured value, in apply order.
    pub fn configured_facets(&self) -> Vec<FacetKind> {
        FacetKind::APPLY_ORDER
            .into_iter()
            .filter(|kind| match kind {
                FacetKind::Versioning => !self.versioning.is_absent(),
                FacetKind::Encryption => !self.encryption.is_absent(),
                FacetKind::PublicAccessBlock => !self.public_access_block.is_absent(),
                FacetKind::Lifecycle => !self.lifecycle_rules.is_absent(),
                FacetKind::Cors => !self.cors_rules.is_absent(),
                FacetKind::Tags => false,
            })
            .collect()
    }
}

/// Which facets a run propagates from source to target.
///
/// Versioning, encryption and public-access-block are always propagated;
/// lifecycle and CORS can be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetSelection {
    pub lifecycle: bool,
    pub cors: bool,
}

impl Default for FacetSelection {
    fn default() -> Self {
        Self {
            lifecycle: true,
            cors: true,
        }
    }
}

impl FacetSelection {
    pub fn includes(&self, kind: FacetKind) -> bool {
        match kind {
            FacetKind::Versioning | FacetKind::Encryption | FacetKind::PublicAccessBlock => true,
            FacetKind::Lifecycle => self.lifecycle,
            FacetKind::Cors => self.cors,
            FacetKind::Tags => false,
        }
    }

    /// Selected facets, in apply order.
    pub fn facets(&self) -> Vec<FacetKind> {
        FacetKind::APPLY_ORDER
            .into_iter()
            .filter(|kind| self.includes(*kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_differs_from_empty() {
        let absent: Facet<Vec<CorsRule>> = Facet::Absent;
        let empty: Facet<Vec<CorsRule>> = Facet::Configured(Vec::new());
        assert_ne!(absent, empty);
        assert!(absent.is_absent());
        assert_eq!(empty.configured().map(Vec::len), Some(0));
    }

    #[test]
    fn test_facet_serde_keeps_absent_marker() {
        let snapshot = BucketSettingsSnapshot {
            versioning: Facet::Configured(VersioningStatus::Enabled),
            lifecycle_rules: Facet::Configured(Vec::new()),
            ..Default::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["encryption"]["state"], "absent");
        assert_eq!(json["lifecycle_rules"]["state"], "configured");
        assert_eq!(json["versioning"]["value"], "enabled");

        let back: BucketSettingsSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_selection_order() {
        let all = FacetSelection::default();
        assert_eq!(all.facets(), FacetKind::APPLY_ORDER.to_vec());

        let core = FacetSelection {
            lifecycle: false,
            cors: false,
        };
        assert_eq!(
            core.facets(),
            vec![
                FacetKind::Versioning,
                FacetKind::Encryption,
                FacetKind::PublicAccessBlock
            ]
        );
    }

    #[test]
    fn test_sse_algorithm_names() {
        for algorithm in [
            SseAlgorithm::Aes256,
            SseAlgorithm::AwsKms,
            SseAlgorithm::AwsKmsDsse,
        ] {
            assert_eq!(SseAlgorithm::parse(algorithm.as_str()), Some(algorithm));
        }
        assert_eq!(SseAlgorithm::parse("rot13"), None);
    }
}
