use clap::Args;

use common::build_info;

use crate::cli::args::OutputFormat;

#[derive(Args, Debug, Clone)]
pub struct Version;

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("Version operation failed: {0}")]
    Failed(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = VersionError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let info = build_info!();
        match ctx.format {
            OutputFormat::Text => Ok(info.to_string()),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&info)?),
        }
    }
}
