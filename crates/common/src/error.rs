use std::fmt;
use std::time::Duration;

use crate::provider::ProviderError;
use crate::replicator::CopyResult;
use crate::settings::FacetKind;

/// Why one bucket's pipeline stopped.
///
/// These never abort the run; the orchestrator records them on the bucket's
/// outcome and moves on.
#[derive(Debug, thiserror::Error)]
pub enum BucketError {
    /// The source could not be found, read or snapshotted
    #[error("source bucket '{bucket}' is unavailable: {cause}")]
    SourceUnavailable {
        bucket: String,
        #[source]
        cause: ProviderError,
    },
    /// The target could not be checked or created
    #[error("target bucket '{bucket}' could not be created: {cause}")]
    TargetUnavailable {
        bucket: String,
        #[source]
        cause: ProviderError,
    },
    #[error("failed to apply {facet} to '{bucket}' (already applied: {}): {cause}", FacetList(.applied))]
    SettingsApply {
        bucket: String,
        facet: FacetKind,
        /// Facets written before the failure; they are not rolled back
        applied: Vec<FacetKind>,
        #[source]
        cause: ProviderError,
    },
    #[error("copy precondition failed on '{bucket}': {detail}")]
    Precondition { bucket: String, detail: String },
    #[error("bucket '{bucket}' still not visible after {waited:?}")]
    ConsistencyTimeout { bucket: String, waited: Duration },
    #[error("{0}")]
    CopyFailure(CopyResult),
    #[error("cancelled before completion")]
    Cancelled,
    /// The pipeline task itself died
    #[error("pipeline aborted: {0}")]
    Aborted(String),
}

impl BucketError {
    /// Stable snake_case name used in machine-readable reports.
    pub fn kind(&self) -> &'static str {
        match self {
            BucketError::SourceUnavailable { .. } => "source_unavailable",
            BucketError::TargetUnavailable { .. } => "target_unavailable",
            BucketError::SettingsApply { .. } => "settings_apply",
            BucketError::Precondition { .. } => "precondition",
            BucketError::ConsistencyTimeout { .. } => "consistency_timeout",
            BucketError::CopyFailure(_) => "copy_failure",
            BucketError::Cancelled => "cancelled",
            BucketError::Aborted(_) => "aborted",
        }
    }
}

struct FacetList<'a>(&'a [FacetKind]);

impl fmt::Display for FacetList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<String> = self.0.iter().map(|k| k.to_string()).collect();
        f.write_str(&names.join(", "))
    }
}
