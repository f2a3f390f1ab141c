//! Re-runnable object copy between a source bucket and its target.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::BucketError;
use crate::provider::{ObjectSummary, StorageProvider};

/// Keys listed in a post-check failure before the rest are elided.
const MAX_REPORTED_KEYS: usize = 5;

/// Result of one copy attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyResult {
    pub succeeded: bool,
    pub objects_copied: u64,
    /// Objects already present on the target with identical content
    pub objects_skipped: u64,
    pub error_detail: Option<String>,
}

impl CopyResult {
    fn failed(mut self, detail: impl Into<String>) -> Self {
        self.succeeded = false;
        self.error_detail = Some(detail.into());
        self
    }
}

impl fmt::Display for CopyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.succeeded {
            write!(
                f,
                "copied {} object(s), skipped {}",
                self.objects_copied, self.objects_skipped
            )
        } else {
            write!(
                f,
                "copy failed after {} object(s): {}",
                self.objects_copied,
                self.error_detail.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

pub struct Replicator {
    provider: Arc<dyn StorageProvider>,
    object_concurrency: usize,
}

impl Replicator {
    pub fn new(provider: Arc<dyn StorageProvider>, object_concurrency: usize) -> Self {
        Self {
            provider,
            object_concurrency: object_concurrency.max(1),
        }
    }

    /// Copy every object of `source` into `target` under the same key.
    ///
    /// Objects the target already holds with the same size and entity tag
    /// are skipped, anything else is overwritten, so a rerun after a partial
    /// failure picks up where the last one stopped. Returns `Err` only when
    /// a precondition fails before any transfer.
    pub async fn copy(&self, source: &str, target: &str) -> Result<CopyResult, BucketError> {
        self.check_preconditions(source, target).await?;

        let mut result = CopyResult::default();

        let source_objects = match self.provider.list_objects(source).await {
            Ok(objects) => objects,
            Err(e) => return Ok(result.failed(format!("listing '{}': {}", source, e))),
        };
        let existing: HashMap<String, ObjectSummary> = match self.provider.list_objects(target).await
        {
            Ok(objects) => objects.into_iter().map(|o| (o.key.clone(), o)).collect(),
            Err(e) => return Ok(result.failed(format!("listing '{}': {}", target, e))),
        };

        let pending: Vec<(String, u64)> = source_objects
            .iter()
            .filter(|object| match existing.get(&object.key) {
                Some(present) if present.same_content(object) => {
                    result.objects_skipped += 1;
                    false
                }
                _ => true,
            })
            .map(|object| (object.key.clone(), object.size))
            .collect();

        tracing::info!(
            source,
            target,
            total = source_objects.len(),
            pending = pending.len(),
            skipped = result.objects_skipped,
            "copying objects"
        );

        let mut transfers = stream::iter(pending)
            .map(|(key, size)| {
                let provider = self.provider.clone();
                let source = source.to_string();
                let target = target.to_string();
                async move {
                    provider
                        .copy_object(&source, &key, &target, size)
                        .await
                        .map_err(|e| (key, e))
                }
            })
            .buffer_unordered(self.object_concurrency);

        while let Some(transfer) = transfers.next().await {
            match transfer {
                Ok(()) => result.objects_copied += 1,
                Err((key, e)) => {
                    tracing::warn!(source, target, key = %key, error = %e, "object copy failed");
                    return Ok(result.failed(format!("copying '{}': {}", key, e)));
                }
            }
        }

        if let Err(detail) = self.post_check(&source_objects, target).await {
            return Ok(result.failed(detail));
        }

        result.succeeded = true;
        Ok(result)
    }

    async fn check_preconditions(&self, source: &str, target: &str) -> Result<(), BucketError> {
        let precondition = |bucket: &str, detail: String| BucketError::Precondition {
            bucket: bucket.to_string(),
            detail,
        };

        self.provider
            .probe_objects(source)
            .await
            .map_err(|e| precondition(source, format!("source is not readable: {}", e)))?;

        match self.provider.bucket_exists(target).await {
            Ok(true) => {}
            Ok(false) => return Err(precondition(target, "target does not exist".to_string())),
            Err(e) => return Err(precondition(target, e.to_string())),
        }

        self.provider
            .probe_objects(target)
            .await
            .map_err(|e| precondition(target, format!("target is not listable: {}", e)))
    }

    /// Every source key must be on the target with the source size.
    async fn post_check(&self, source_objects: &[ObjectSummary], target: &str) -> Result<(), String> {
        let copied: HashMap<String, u64> = self
            .provider
            .list_objects(target)
            .await
            .map_err(|e| format!("post-check listing '{}': {}", target, e))?
            .into_iter()
            .map(|o| (o.key, o.size))
            .collect();

        let missing: Vec<&str> = source_objects
            .iter()
            .filter(|o| copied.get(&o.key) != Some(&o.size))
            .map(|o| o.key.as_str())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let mut shown = missing
            .iter()
            .take(MAX_REPORTED_KEYS)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        if missing.len() > MAX_REPORTED_KEYS {
            shown.push_str(", ...");
        }
        Err(format!(
            "post-check: {} object(s) missing or mismatched on '{}': {}",
            missing.len(),
            target,
            shown
        ))
    }
}
