use std::path::PathBuf;

use clap::Args;

use crate::state::{AppConfig, AppState, ProviderConfig};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Region new buckets are created in
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Use directories under this path as buckets instead of S3
    #[arg(long)]
    pub local_path: Option<PathBuf>,

    /// Custom S3-compatible endpoint
    #[arg(long, conflicts_with = "local_path")]
    pub endpoint: Option<String>,

    /// Named AWS profile to load credentials from
    #[arg(long, conflicts_with = "local_path")]
    pub profile: Option<String>,

    /// Address buckets by path rather than virtual host
    #[arg(long, conflicts_with = "local_path")]
    pub force_path_style: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let provider = match &self.local_path {
            Some(path) => ProviderConfig::Local { path: path.clone() },
            None => ProviderConfig::S3 {
                endpoint: self.endpoint.clone(),
                profile: self.profile.clone(),
                force_path_style: self.force_path_style,
            },
        };
        let config = AppConfig {
            region: self.region.clone(),
            provider,
            ..AppConfig::default()
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let provider_str = match &state.config.provider {
            ProviderConfig::S3 { endpoint, .. } => match endpoint {
                Some(endpoint) => format!("s3 ({})", endpoint),
                None => "s3".to_string(),
            },
            ProviderConfig::Local { path } => format!("local ({})", path.display()),
        };

        let output = format!(
            "Initialized rebucket directory at: {}\n\
             - Config: {}\n\
             - Provider: {}\n\
             - Region: {}\n\
             - Naming: '{}' -> '{}'",
            state.rebucket_dir.display(),
            state.config_path.display(),
            provider_str,
            state.config.region,
            state.config.naming.separator,
            state.config.naming.substitute,
        );

        Ok(output)
    }
}
