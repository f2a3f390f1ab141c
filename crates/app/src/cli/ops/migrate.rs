use std::fmt;

use clap::Args;
use common::prelude::{Cancellation, MigrationPlan, MigrationRequest, Migrator, NamingError};

use crate::cli::args::{BucketNames, TargetOptions};
use crate::process;

/// Recreate source buckets under their new names
#[derive(Args, Debug, Clone)]
pub struct Migrate {
    #[command(flatten)]
    pub buckets: BucketNames,

    /// Copy every object into the new bucket
    #[arg(long)]
    pub copy_data: bool,

    /// Only report the mapping; make no provider calls
    #[arg(long)]
    pub plan_only: bool,

    /// Region new buckets are created in
    #[arg(long)]
    pub region: Option<String>,

    #[command(flatten)]
    pub target: TargetOptions,

    /// Buckets migrated at once
    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Debug)]
pub struct MigrateOutput {
    pub report: String,
    /// Every bucket succeeded
    pub success: bool,
}

impl fmt::Display for MigrateOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.report)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("failed to read bucket names: {0}")]
    Names(#[source] std::io::Error),
    #[error("no source buckets given")]
    Empty,
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error(transparent)]
    Engine(#[from] common::migrate::MigrateError),
    #[error("failed to set up storage provider: {0:#}")]
    Provider(anyhow::Error),
    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

impl Migrate {
    fn request(&self, ctx: &crate::cli::op::OpContext) -> Result<MigrationRequest, MigrateError> {
        let config = &ctx.state.config;
        let sources = self.buckets.load().map_err(MigrateError::Names)?;
        if sources.is_empty() {
            return Err(MigrateError::Empty);
        }

        Ok(MigrationRequest {
            sources,
            copy_data: self.copy_data,
            plan_only: self.plan_only,
            region: self.region.clone().unwrap_or_else(|| config.region.clone()),
            tags: self.target.tags(config),
            facets: self.target.facets(config),
        })
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Migrate {
    type Error = MigrateError;
    type Output = MigrateOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = &ctx.state.config;
        let request = self.request(ctx)?;

        if request.plan_only {
            let plan = MigrationPlan::build(&config.naming, &request)?;
            return Ok(MigrateOutput {
                report: ctx.format.render(&common::report::render(&plan, None)),
                success: true,
            });
        }

        let mut migration_config = config.migration_config();
        if let Some(concurrency) = self.concurrency {
            migration_config.concurrency = concurrency;
        }

        let provider = ctx
            .provider(Some(request.region.as_str()))
            .await
            .map_err(MigrateError::Provider)?;
        let (signal_handle, cancel_rx) = process::shutdown_signal().map_err(MigrateError::Signal)?;

        let migrator =
            Migrator::new(provider, migration_config).with_cancellation(Cancellation::new(cancel_rx));
        let result = migrator.migrate(&config.naming, &request).await;
        signal_handle.abort();
        let report = result?;

        for failure in report.failures() {
            tracing::warn!(
                source = failure.mapping.source.as_str(),
                target = failure.mapping.target.as_str(),
                status = failure.status.as_str(),
                "bucket did not migrate cleanly"
            );
        }

        Ok(MigrateOutput {
            report: ctx.format.render(&report.render()),
            success: report.is_success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cli::args::OutputFormat;
    use crate::cli::op::{Op, OpContext};
    use crate::state::{AppConfig, AppState, ProviderConfig};

    fn context(root: PathBuf, format: OutputFormat) -> OpContext {
        let mut config = AppConfig::default();
        config.provider = ProviderConfig::Local { path: root.clone() };
        config.tags.insert("migrated-by".to_string(), "rebucket".to_string());
        let state = AppState {
            rebucket_dir: root.clone(),
            config_path: root.join("config.toml"),
            config,
        };
        OpContext::new(state, None, format)
    }

    fn migrate(names: &[&str]) -> Migrate {
        Migrate {
            buckets: BucketNames {
                names: names.iter().map(|n| n.to_string()).collect(),
                names_file: None,
            },
            copy_data: false,
            plan_only: false,
            region: None,
            target: TargetOptions {
                tags: vec![("env".to_string(), "prod".to_string())],
                skip_lifecycle: false,
                skip_cors: true,
            },
            concurrency: None,
        }
    }

    #[test]
    fn test_request_merges_flags_over_config() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path().to_path_buf(), OutputFormat::Text);
        let mut op = migrate(&["a.b"]);
        op.region = Some("eu-central-1".to_string());

        let request = op.request(&ctx).unwrap();
        assert_eq!(request.region, "eu-central-1");
        assert_eq!(request.tags.get("env").map(String::as_str), Some("prod"));
        assert_eq!(
            request.tags.get("migrated-by").map(String::as_str),
            Some("rebucket")
        );
        assert!(request.facets.lifecycle);
        assert!(!request.facets.cors);
    }

    #[test]
    fn test_request_requires_names() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path().to_path_buf(), OutputFormat::Text);
        assert!(matches!(
            migrate(&[]).request(&ctx),
            Err(MigrateError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_plan_only_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("buckets");
        let ctx = context(root.clone(), OutputFormat::Json);
        let mut op = migrate(&["logs.prod"]);
        op.plan_only = true;

        let output = op.execute(&ctx).await.unwrap();
        assert!(output.success);
        let json: serde_json::Value = serde_json::from_str(&output.report).unwrap();
        assert_eq!(json["mode"], "plan");
        assert_eq!(json["mapping"]["logs.prod"], "logs-prod");
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path().join("buckets"), OutputFormat::Json);

        let output = migrate(&["not.there"]).execute(&ctx).await.unwrap();
        assert!(!output.success);
        let json: serde_json::Value = serde_json::from_str(&output.report).unwrap();
        assert_eq!(json["buckets"][0]["error"]["kind"], "source_unavailable");
    }
}
