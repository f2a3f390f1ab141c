use clap::Args;
use common::prelude::{MigrationPlan, MigrationRequest, NamingError};

use crate::cli::args::{BucketNames, TargetOptions};

/// Show the rename mapping without touching any bucket
#[derive(Args, Debug, Clone)]
pub struct Plan {
    #[command(flatten)]
    pub buckets: BucketNames,

    /// Report the data copy a migrate run would do
    #[arg(long)]
    pub copy_data: bool,

    /// Region new buckets would be created in
    #[arg(long)]
    pub region: Option<String>,

    #[command(flatten)]
    pub target: TargetOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("failed to read bucket names: {0}")]
    Names(#[from] std::io::Error),
    #[error("no source buckets given")]
    Empty,
    #[error(transparent)]
    Naming(#[from] NamingError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Plan {
    type Error = PlanError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = &ctx.state.config;
        let sources = self.buckets.load()?;
        if sources.is_empty() {
            return Err(PlanError::Empty);
        }

        let request = MigrationRequest {
            sources,
            copy_data: self.copy_data,
            plan_only: true,
            region: self.region.clone().unwrap_or_else(|| config.region.clone()),
            tags: self.target.tags(config),
            facets: self.target.facets(config),
        };
        let plan = MigrationPlan::build(&config.naming, &request)?;

        Ok(ctx.format.render(&common::report::render(&plan, None)))
    }
}
