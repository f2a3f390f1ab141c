//! Run orchestration
//!
//! A [`Migrator`] drives one pipeline per plan entry:
//!
//! 1. read the source snapshot
//! 2. provision the target
//! 3. copy objects, when requested, retrying failed attempts
//!
//! Pipelines run as tokio tasks, at most `concurrency` at a time, and share
//! nothing but the provider handle. A failing bucket never stops the
//! others. Cancellation is checked between steps only, so a cancelled run
//! leaves every applied setting and copied object in place.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Semaphore};

use crate::error::BucketError;
use crate::naming::{NameMapping, NamingError, NamingPolicy};
use crate::plan::{MigrationPlan, MigrationRequest, PlanEntry};
use crate::provider::{StorageProvider, Tags};
use crate::provisioner::{ConsistencyConfig, ProvisionSummary, Provisioner};
use crate::reader::read_snapshot;
use crate::replicator::{CopyResult, Replicator};
use crate::report::{render, RenderedReport};
use crate::settings::BucketSettingsSnapshot;

/// Run-level failures. Everything per-bucket lands in a [`BucketOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error(transparent)]
    Naming(#[from] NamingError),
}

/// Tuning knobs for a run.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Bucket pipelines active at once
    pub concurrency: usize,
    /// Object copies in flight within one bucket
    pub object_concurrency: usize,
    /// Copy attempts per bucket before giving up
    pub copy_attempts: u32,
    /// Delay before the second copy attempt; doubles after each retry
    pub copy_backoff: Duration,
    pub consistency: ConsistencyConfig,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            object_concurrency: 8,
            copy_attempts: 3,
            copy_backoff: Duration::from_secs(1),
            consistency: ConsistencyConfig::default(),
        }
    }
}

/// Observes a run-wide stop signal.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Option<watch::Receiver<bool>>);

impl Cancellation {
    pub fn new(receiver: watch::Receiver<bool>) -> Self {
        Self(Some(receiver))
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketStatus {
    Succeeded,
    /// The target was changed but the pipeline did not finish
    PartiallyApplied,
    Failed,
    Cancelled,
}

impl BucketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketStatus::Succeeded => "succeeded",
            BucketStatus::PartiallyApplied => "partially applied",
            BucketStatus::Failed => "failed",
            BucketStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyStatus {
    NotRequested,
    Succeeded(CopyResult),
    Failed(CopyResult),
    /// Requested, but never attempted
    Skipped(String),
}

impl CopyStatus {
    /// Marker shown next to every mapping in a report.
    pub fn marker(&self) -> &'static str {
        match self {
            CopyStatus::NotRequested => "not requested",
            CopyStatus::Succeeded(_) => "succeeded",
            CopyStatus::Failed(_) => "failed",
            CopyStatus::Skipped(_) => "skipped",
        }
    }

    pub fn result(&self) -> Option<&CopyResult> {
        match self {
            CopyStatus::Succeeded(result) | CopyStatus::Failed(result) => Some(result),
            _ => None,
        }
    }
}

/// Terminal record of one bucket's pipeline.
#[derive(Debug)]
pub struct BucketOutcome {
    pub mapping: NameMapping,
    /// Fully-qualified locator of the target
    pub locator: String,
    pub status: BucketStatus,
    pub snapshot: Option<BucketSettingsSnapshot>,
    pub provisioning: Option<ProvisionSummary>,
    pub copy: CopyStatus,
    pub error: Option<BucketError>,
}

impl BucketOutcome {
    fn new(entry: &PlanEntry, locator: String) -> Self {
        Self {
            mapping: entry.mapping.clone(),
            locator,
            status: BucketStatus::Succeeded,
            snapshot: None,
            provisioning: None,
            copy: if entry.copy_requested {
                CopyStatus::Skipped("not reached".to_string())
            } else {
                CopyStatus::NotRequested
            },
            error: None,
        }
    }

    fn target_changed(&self) -> bool {
        self.provisioning.as_ref().is_some_and(ProvisionSummary::changed)
            || self.copy.result().is_some_and(|r| r.objects_copied > 0)
    }

    fn fail(mut self, error: BucketError) -> Self {
        tracing::warn!(
            source = %self.mapping.source,
            target = %self.mapping.target,
            error = %error,
            "bucket migration failed"
        );
        self.status = if self.target_changed() {
            BucketStatus::PartiallyApplied
        } else {
            BucketStatus::Failed
        };
        self.error = Some(error);
        self
    }

    fn cancel(mut self) -> Self {
        tracing::info!(source = %self.mapping.source, "bucket pipeline cancelled");
        self.status = BucketStatus::Cancelled;
        self.error = Some(BucketError::Cancelled);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == BucketStatus::Succeeded
    }
}

/// A finished run: the plan plus, unless it was plan-only, every bucket's
/// outcome in plan order.
#[derive(Debug)]
pub struct MigrationReport {
    pub plan: MigrationPlan,
    pub outcomes: Option<Vec<BucketOutcome>>,
}

impl MigrationReport {
    /// Buckets that did not succeed.
    pub fn failures(&self) -> Vec<&BucketOutcome> {
        self.outcomes
            .iter()
            .flatten()
            .filter(|o| !o.is_success())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn render(&self) -> RenderedReport {
        render(&self.plan, self.outcomes.as_deref())
    }
}

/// Per-pipeline shared handles.
struct Pipeline {
    provider: Arc<dyn StorageProvider>,
    provisioner: Provisioner,
    replicator: Replicator,
    config: MigrationConfig,
    cancellation: Cancellation,
}

pub struct Migrator {
    provider: Arc<dyn StorageProvider>,
    config: MigrationConfig,
    cancellation: Cancellation,
}

impl Migrator {
    pub fn new(provider: Arc<dyn StorageProvider>, config: MigrationConfig) -> Self {
        Self {
            provider,
            config,
            cancellation: Cancellation::default(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Validate `request`, build the plan and, unless plan-only, run it.
    pub async fn migrate(
        &self,
        policy: &NamingPolicy,
        request: &MigrationRequest,
    ) -> Result<MigrationReport, MigrateError> {
        let plan = MigrationPlan::build(policy, request)?;
        tracing::info!(
            buckets = plan.len(),
            plan_only = plan.is_plan_only(),
            region = plan.region(),
            "migration plan built"
        );

        if plan.is_plan_only() {
            return Ok(MigrationReport {
                plan,
                outcomes: None,
            });
        }

        let outcomes = self.execute(&plan).await;
        Ok(MigrationReport {
            plan,
            outcomes: Some(outcomes),
        })
    }

    /// Run every entry of `plan`. Outcomes come back in plan order.
    pub async fn execute(&self, plan: &MigrationPlan) -> Vec<BucketOutcome> {
        let pipeline = Arc::new(Pipeline {
            provider: self.provider.clone(),
            provisioner: Provisioner::new(
                self.provider.clone(),
                plan.region(),
                self.config.consistency,
            ),
            replicator: Replicator::new(self.provider.clone(), self.config.object_concurrency),
            config: self.config.clone(),
            cancellation: self.cancellation.clone(),
        });
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        let handles: Vec<_> = plan
            .entries()
            .iter()
            .map(|entry| {
                let pipeline = pipeline.clone();
                let permits = permits.clone();
                let entry = entry.clone();
                let tags = plan.tags().clone();
                tokio::spawn(async move {
                    // the semaphore is never closed
                    let _permit = permits.acquire_owned().await.ok();
                    pipeline.run(&entry, &tags).await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (handle, entry) in handles.into_iter().zip(plan.entries()) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let locator = self.provider.locator(entry.mapping.target.as_str());
                    BucketOutcome::new(entry, locator).fail(BucketError::Aborted(e.to_string()))
                }
            };
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        tracing::info!(
            buckets = outcomes.len(),
            failed,
            "migration run finished"
        );
        outcomes
    }
}

impl Pipeline {
    async fn run(&self, entry: &PlanEntry, tags: &Tags) -> BucketOutcome {
        let source = entry.mapping.source.as_str();
        let target = entry.mapping.target.as_str();
        let mut outcome = BucketOutcome::new(entry, self.provider.locator(target));

        if self.cancellation.is_cancelled() {
            return outcome.cancel();
        }

        tracing::info!(source, target, "migrating bucket");
        let snapshot = match read_snapshot(self.provider.as_ref(), source, entry.facets).await {
            Ok(snapshot) => snapshot,
            Err(e) => return outcome.fail(e),
        };
        outcome.snapshot = Some(snapshot.clone());

        if self.cancellation.is_cancelled() {
            return outcome.cancel();
        }

        match self
            .provisioner
            .ensure(target, &snapshot, entry.facets, tags)
            .await
        {
            Ok(summary) => outcome.provisioning = Some(summary),
            Err(e) => {
                outcome.provisioning = Some(e.progress);
                if entry.copy_requested {
                    outcome.copy = CopyStatus::Skipped("provisioning failed".to_string());
                }
                return outcome.fail(e.error);
            }
        }

        if !entry.copy_requested {
            return outcome;
        }
        if self.cancellation.is_cancelled() {
            outcome.copy = CopyStatus::Skipped("cancelled".to_string());
            return outcome.cancel();
        }

        match self.copy_with_retries(source, target).await {
            Ok(result) if result.succeeded => {
                outcome.copy = CopyStatus::Succeeded(result);
                outcome
            }
            Ok(result) => {
                outcome.copy = CopyStatus::Failed(result.clone());
                outcome.fail(BucketError::CopyFailure(result))
            }
            Err(stopped) => {
                outcome.copy = stopped.copy_status();
                match stopped.error {
                    BucketError::Cancelled => outcome.cancel(),
                    error => outcome.fail(error),
                }
            }
        }
    }

    /// Copy, retrying the whole bucket while attempts remain. Each rerun
    /// skips what earlier attempts already transferred.
    async fn copy_with_retries(&self, source: &str, target: &str) -> Result<CopyResult, CopyStopped> {
        let attempts = self.config.copy_attempts.max(1);
        let mut delay = self.config.copy_backoff;
        let mut copied = 0;
        let mut attempt = 1;

        loop {
            let mut result = self
                .replicator
                .copy(source, target)
                .await
                .map_err(|error| CopyStopped { error, copied })?;
            if result.succeeded || attempt >= attempts {
                // earlier attempts' transfers show up as skipped on this one
                result.objects_skipped = result.objects_skipped.saturating_sub(copied);
                result.objects_copied += copied;
                return Ok(result);
            }
            copied += result.objects_copied;

            tracing::warn!(
                source,
                target,
                attempt,
                error = result.error_detail.as_deref().unwrap_or_default(),
                "copy attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            delay *= 2;
            attempt += 1;

            if self.cancellation.is_cancelled() {
                return Err(CopyStopped {
                    error: BucketError::Cancelled,
                    copied,
                });
            }
        }
    }
}

/// A copy that ended without a final attempt, with what earlier attempts moved.
struct CopyStopped {
    error: BucketError,
    copied: u64,
}

impl CopyStopped {
    fn copy_status(&self) -> CopyStatus {
        if self.copied == 0 {
            let reason = match self.error {
                BucketError::Cancelled => "cancelled",
                _ => "precondition failed",
            };
            return CopyStatus::Skipped(reason.to_string());
        }
        CopyStatus::Failed(CopyResult {
            succeeded: false,
            objects_copied: self.copied,
            objects_skipped: 0,
            error_detail: Some(self.error.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::SourceName;
    use crate::provider::MemoryStorageProvider;
    use crate::settings::FacetSelection;

    fn request(names: &[&str], copy_data: bool) -> MigrationRequest {
        MigrationRequest {
            sources: names.iter().map(|n| SourceName::from(*n)).collect(),
            copy_data,
            plan_only: false,
            region: "us-east-1".to_string(),
            tags: Tags::new(),
            facets: FacetSelection::default(),
        }
    }

    fn migrator(provider: &MemoryStorageProvider) -> Migrator {
        Migrator::new(
            Arc::new(provider.clone()),
            MigrationConfig {
                copy_backoff: Duration::from_millis(10),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_outcomes_follow_plan_order() {
        let provider = MemoryStorageProvider::new();
        for name in ["c.bucket", "a.bucket", "b.bucket"] {
            provider.seed_bucket(name, BucketSettingsSnapshot::default());
        }

        let report = migrator(&provider)
            .migrate(
                &NamingPolicy::default(),
                &request(&["c.bucket", "a.bucket", "b.bucket"], false),
            )
            .await
            .unwrap();

        let outcomes = report.outcomes.as_ref().unwrap();
        let targets: Vec<_> = outcomes.iter().map(|o| o.mapping.target.as_str()).collect();
        assert_eq!(targets, vec!["c-bucket", "a-bucket", "b-bucket"]);
        assert!(report.is_success());
        assert!(outcomes.iter().all(|o| o.copy == CopyStatus::NotRequested));
        assert_eq!(outcomes[0].locator, "memory://c-bucket");
    }

    #[tokio::test]
    async fn test_copy_is_skipped_when_provisioning_fails() {
        let provider = MemoryStorageProvider::new();
        provider.seed_bucket("a.src", BucketSettingsSnapshot::default());
        provider.seed_object("a.src", "k", "v");
        provider.fail_facet_writes("a-src", crate::settings::FacetKind::PublicAccessBlock);

        let report = migrator(&provider)
            .migrate(&NamingPolicy::default(), &request(&["a.src"], true))
            .await
            .unwrap();

        let outcome = &report.outcomes.as_ref().unwrap()[0];
        assert_eq!(outcome.status, BucketStatus::PartiallyApplied);
        assert_eq!(outcome.copy.marker(), "skipped");
        assert!(matches!(outcome.error, Some(BucketError::SettingsApply { .. })));
        assert!(provider.objects("a-src").is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_touches_nothing() {
        let provider = MemoryStorageProvider::new();
        provider.seed_bucket("a.src", BucketSettingsSnapshot::default());
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let report = migrator(&provider)
            .with_cancellation(Cancellation::new(rx))
            .migrate(&NamingPolicy::default(), &request(&["a.src"], true))
            .await
            .unwrap();

        let outcome = &report.outcomes.as_ref().unwrap()[0];
        assert_eq!(outcome.status, BucketStatus::Cancelled);
        assert!(!provider.has_bucket("a-src"));
        assert_eq!(report.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_naming_errors_abort_the_run() {
        let provider = MemoryStorageProvider::new();
        let err = migrator(&provider)
            .migrate(&NamingPolicy::default(), &request(&["a.b", "a-b"], true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Naming(NamingError::DuplicateTarget(_))
        ));
        assert_eq!(provider.mutations(), 0);
    }
}
