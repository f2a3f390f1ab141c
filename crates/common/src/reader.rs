//! Read-only settings snapshot of a bucket.

use crate::error::BucketError;
use crate::provider::{ProviderError, StorageProvider};
use crate::settings::{BucketSettingsSnapshot, Facet, FacetKind, FacetSelection};

/// Turn a provider "not configured" answer into an absent facet.
pub fn facet_or_absent<T>(result: Result<T, ProviderError>) -> Result<Facet<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Facet::Configured(value)),
        Err(ProviderError::NotConfigured) => Ok(Facet::Absent),
        Err(e) => Err(e),
    }
}

/// Read every selected facet of `bucket`.
///
/// Facets outside `selection` are not read and come back absent. Any
/// failure, including the bucket not existing, is reported as
/// [`BucketError::SourceUnavailable`].
pub async fn read_snapshot(
    provider: &dyn StorageProvider,
    bucket: &str,
    selection: FacetSelection,
) -> Result<BucketSettingsSnapshot, BucketError> {
    let unavailable = |cause| BucketError::SourceUnavailable {
        bucket: bucket.to_string(),
        cause,
    };

    if !provider.bucket_exists(bucket).await.map_err(unavailable)? {
        return Err(unavailable(ProviderError::BucketNotFound(bucket.to_string())));
    }

    let snapshot = read_facets(provider, bucket, selection)
        .await
        .map_err(unavailable)?;

    tracing::debug!(
        bucket,
        configured = ?snapshot.configured_facets(),
        "read settings snapshot"
    );
    Ok(snapshot)
}

async fn read_facets(
    provider: &dyn StorageProvider,
    bucket: &str,
    selection: FacetSelection,
) -> Result<BucketSettingsSnapshot, ProviderError> {
    let mut snapshot = BucketSettingsSnapshot {
        versioning: facet_or_absent(provider.get_versioning(bucket).await)?,
        encryption: facet_or_absent(provider.get_encryption(bucket).await)?,
        public_access_block: facet_or_absent(provider.get_public_access_block(bucket).await)?,
        ..Default::default()
    };
    if selection.includes(FacetKind::Lifecycle) {
        snapshot.lifecycle_rules = facet_or_absent(provider.get_lifecycle(bucket).await)?;
    }
    if selection.includes(FacetKind::Cors) {
        snapshot.cors_rules = facet_or_absent(provider.get_cors(bucket).await)?;
    }
    Ok(snapshot)
}
