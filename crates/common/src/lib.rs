/**
 * Bucket-name transformation: source names in,
 *  validated and collision-free target names out.
 */
pub mod naming;
/**
 * Bucket-level settings model: facets that may be
 *  explicitly absent, and the snapshot of a bucket.
 */
pub mod settings;
/**
 * The storage capability interface the engine runs
 *  against, plus S3, local-directory and in-memory
 *  implementations.
 */
pub mod provider;
/**
 * Read-only settings snapshots of source buckets.
 */
pub mod reader;
/**
 * Idempotent creation and reconciliation of
 *  target buckets.
 */
pub mod provisioner;
/**
 * Re-runnable object copy from source to target.
 */
pub mod replicator;
pub mod error;
pub mod plan;
/**
 * Per-bucket pipelines under a concurrency cap,
 *  with cancellation and copy retries.
 */
pub mod migrate;
/**
 * Text and JSON rendering of plans and runs.
 */
pub mod report;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::error::BucketError;
    pub use crate::migrate::{
        BucketOutcome, BucketStatus, Cancellation, CopyStatus, MigrateError, MigrationConfig,
        MigrationReport, Migrator,
    };
    pub use crate::naming::{NameMapping, NamingError, NamingPolicy, SourceName, TargetName};
    pub use crate::plan::{MigrationPlan, MigrationRequest, PlanEntry};
    pub use crate::provider::{
        LocalStorageProvider, MemoryStorageProvider, ProviderError, S3ProviderConfig,
        S3StorageProvider, StorageProvider, Tags,
    };
    pub use crate::provisioner::{ConsistencyConfig, ProvisionSummary};
    pub use crate::replicator::CopyResult;
    pub use crate::report::RenderedReport;
    pub use crate::settings::{BucketSettingsSnapshot, Facet, FacetKind, FacetSelection};
    pub use crate::version::build_info;
}
