//! Idempotent target bucket provisioning
//!
//! [`Provisioner::ensure`] makes a target bucket exist and carry the
//! settings of a source snapshot. Every facet is reconciled: the target's
//! current value is read and written only when it differs, so repeating
//! `ensure` with the same snapshot writes nothing.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::BucketError;
use crate::provider::{ProviderError, StorageProvider, Tags};
use crate::reader::facet_or_absent;
use crate::settings::{
    BucketSettingsSnapshot, Facet, FacetKind, FacetSelection, PublicAccessBlockRule,
};

/// Bounded exponential backoff used while waiting for a new bucket to
/// become visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Give up once this much time has passed since creation
    pub timeout: Duration,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            timeout: Duration::from_secs(60),
        }
    }
}

/// What `ensure` did to a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionSummary {
    pub created: bool,
    /// Facets that were written, in apply order
    pub applied: Vec<FacetKind>,
    /// Facets that already matched and were left alone
    pub unchanged: Vec<FacetKind>,
}

impl ProvisionSummary {
    /// Whether the target was changed at all.
    pub fn changed(&self) -> bool {
        self.created || !self.applied.is_empty()
    }
}

/// A failed `ensure`, together with whatever it managed before failing.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ProvisionError {
    pub progress: ProvisionSummary,
    pub error: BucketError,
}

enum Action<'a, T> {
    Keep,
    Put(&'a T),
    Delete,
}

fn decide<'a, T: PartialEq>(current: &Facet<T>, desired: &'a Facet<T>) -> Action<'a, T> {
    match desired {
        Facet::Absent if current.is_absent() => Action::Keep,
        Facet::Absent => Action::Delete,
        Facet::Configured(value) if current.configured() == Some(value) => Action::Keep,
        Facet::Configured(value) => Action::Put(value),
    }
}

pub struct Provisioner {
    provider: Arc<dyn StorageProvider>,
    region: String,
    consistency: ConsistencyConfig,
}

impl Provisioner {
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        region: impl Into<String>,
        consistency: ConsistencyConfig,
    ) -> Self {
        Self {
            provider,
            region: region.into(),
            consistency,
        }
    }

    /// Make `target` exist and match `snapshot` on every selected facet,
    /// then merge `tags` into its tag set.
    ///
    /// Facets are applied in [`FacetKind::APPLY_ORDER`]. The first failure
    /// stops provisioning; facets applied before it stay applied.
    pub async fn ensure(
        &self,
        target: &str,
        snapshot: &BucketSettingsSnapshot,
        selection: FacetSelection,
        tags: &Tags,
    ) -> Result<ProvisionSummary, ProvisionError> {
        let mut summary = ProvisionSummary::default();

        let created = self.create_if_missing(target).await;
        let waited = match created {
            Ok(true) => {
                summary.created = true;
                self.wait_until_visible(target).await
            }
            Ok(false) => Ok(()),
            Err(error) => Err(error),
        };
        if let Err(error) = waited {
            return Err(ProvisionError {
                progress: summary,
                error,
            });
        }

        for kind in selection.facets() {
            match self.reconcile(target, kind, snapshot).await {
                Ok(true) => summary.applied.push(kind),
                Ok(false) => summary.unchanged.push(kind),
                Err(cause) => return Err(self.apply_failed(target, kind, summary, cause)),
            }
        }

        if !tags.is_empty() {
            match self.reconcile_tags(target, tags).await {
                Ok(true) => summary.applied.push(FacetKind::Tags),
                Ok(false) => summary.unchanged.push(FacetKind::Tags),
                Err(cause) => {
                    return Err(self.apply_failed(target, FacetKind::Tags, summary, cause))
                }
            }
        }

        tracing::info!(
            bucket = target,
            created = summary.created,
            applied = ?summary.applied,
            "target provisioned"
        );
        Ok(summary)
    }

    fn apply_failed(
        &self,
        target: &str,
        facet: FacetKind,
        progress: ProvisionSummary,
        cause: ProviderError,
    ) -> ProvisionError {
        ProvisionError {
            error: BucketError::SettingsApply {
                bucket: target.to_string(),
                facet,
                applied: progress.applied.clone(),
                cause,
            },
            progress,
        }
    }

    async fn create_if_missing(&self, target: &str) -> Result<bool, BucketError> {
        let unavailable = |cause| BucketError::TargetUnavailable {
            bucket: target.to_string(),
            cause,
        };

        if self
            .provider
            .bucket_exists(target)
            .await
            .map_err(unavailable)?
        {
            tracing::debug!(bucket = target, "target already exists, reconciling");
            return Ok(false);
        }

        self.provider
            .create_bucket(target, &self.region)
            .await
            .map_err(unavailable)?;
        tracing::info!(bucket = target, region = %self.region, "created target bucket");
        Ok(true)
    }

    /// Poll existence with bounded exponential backoff.
    async fn wait_until_visible(&self, target: &str) -> Result<(), BucketError> {
        let started = Instant::now();
        let mut delay = self.consistency.initial_backoff;

        loop {
            let visible = self
                .provider
                .bucket_exists(target)
                .await
                .map_err(|cause| BucketError::TargetUnavailable {
                    bucket: target.to_string(),
                    cause,
                })?;
            if visible {
                return Ok(());
            }

            let waited = started.elapsed();
            if waited + delay > self.consistency.timeout {
                return Err(BucketError::ConsistencyTimeout {
                    bucket: target.to_string(),
                    waited,
                });
            }
            tracing::debug!(bucket = target, ?delay, "waiting for bucket to become visible");
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.consistency.max_backoff);
        }
    }

    /// Bring one facet of `target` in line with `snapshot`. Returns whether
    /// anything was written.
    async fn reconcile(
        &self,
        target: &str,
        kind: FacetKind,
        snapshot: &BucketSettingsSnapshot,
    ) -> Result<bool, ProviderError> {
        let provider = self.provider.as_ref();

        let written = match kind {
            FacetKind::Versioning => {
                // a bucket can never go back to "never versioned"
                let Facet::Configured(status) = snapshot.versioning else {
                    return Ok(false);
                };
                let current = facet_or_absent(provider.get_versioning(target).await)?;
                if current.configured() == Some(&status) {
                    false
                } else {
                    provider.put_versioning(target, status).await?;
                    true
                }
            }
            FacetKind::Encryption => {
                let current = facet_or_absent(provider.get_encryption(target).await)?;
                match decide(&current, &snapshot.encryption) {
                    Action::Keep => false,
                    Action::Put(rule) => {
                        provider.put_encryption(target, rule).await?;
                        true
                    }
                    Action::Delete => {
                        provider.delete_encryption(target).await?;
                        true
                    }
                }
            }
            FacetKind::PublicAccessBlock => {
                let desired = Facet::Configured(
                    snapshot
                        .public_access_block
                        .configured()
                        .copied()
                        .unwrap_or_else(PublicAccessBlockRule::locked_down),
                );
                let current = facet_or_absent(provider.get_public_access_block(target).await)?;
                match decide(&current, &desired) {
                    Action::Put(rule) => {
                        provider.put_public_access_block(target, rule).await?;
                        true
                    }
                    Action::Keep | Action::Delete => false,
                }
            }
            FacetKind::Lifecycle => {
                let current = facet_or_absent(provider.get_lifecycle(target).await)?;
                match decide(&current, &snapshot.lifecycle_rules) {
                    Action::Keep => false,
                    Action::Put(rules) => {
                        provider.put_lifecycle(target, rules).await?;
                        true
                    }
                    Action::Delete => {
                        provider.delete_lifecycle(target).await?;
                        true
                    }
                }
            }
            FacetKind::Cors => {
                let current = facet_or_absent(provider.get_cors(target).await)?;
                match decide(&current, &snapshot.cors_rules) {
                    Action::Keep => false,
                    Action::Put(rules) => {
                        provider.put_cors(target, rules).await?;
                        true
                    }
                    Action::Delete => {
                        provider.delete_cors(target).await?;
                        true
                    }
                }
            }
            FacetKind::Tags => false,
        };

        tracing::debug!(bucket = target, facet = %kind, written, "reconciled facet");
        Ok(written)
    }

    /// Merge `tags` over the target's existing tags.
    async fn reconcile_tags(&self, target: &str, tags: &Tags) -> Result<bool, ProviderError> {
        let current = facet_or_absent(self.provider.get_tags(target).await)?
            .configured()
            .cloned()
            .unwrap_or_default();

        let mut merged = current.clone();
        merged.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        if merged == current {
            return Ok(false);
        }
        self.provider.put_tags(target, &merged).await?;
        Ok(true)
    }
}
