use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use common::prelude::{LocalStorageProvider, S3ProviderConfig, S3StorageProvider, StorageProvider};

use crate::cli::args::OutputFormat;
use crate::state::{AppState, ProviderConfig};

#[derive(Debug, Clone)]
pub struct OpContext {
    /// Loaded config, or defaults when none has been written
    pub state: AppState,
    /// Optional custom config path (defaults to ~/.rebucket)
    pub config_path: Option<PathBuf>,
    pub format: OutputFormat,
}

impl OpContext {
    pub fn new(state: AppState, config_path: Option<PathBuf>, format: OutputFormat) -> Self {
        Self {
            state,
            config_path,
            format,
        }
    }

    /// Build the storage provider the config points at.
    ///
    /// `region` overrides the configured one for S3 clients.
    pub async fn provider(&self, region: Option<&str>) -> anyhow::Result<Arc<dyn StorageProvider>> {
        let config = &self.state.config;
        let region = region.unwrap_or(&config.region).to_string();

        match &config.provider {
            ProviderConfig::S3 {
                endpoint,
                profile,
                force_path_style,
            } => {
                let s3_config = S3ProviderConfig {
                    region,
                    endpoint: endpoint.clone(),
                    profile: profile.clone(),
                    force_path_style: *force_path_style,
                };
                tracing::debug!(?s3_config, "using S3 provider");
                Ok(Arc::new(S3StorageProvider::new(&s3_config).await))
            }
            ProviderConfig::Local { path } => {
                std::fs::create_dir_all(path)
                    .with_context(|| format!("creating local bucket root {}", path.display()))?;
                tracing::debug!(root = %path.display(), "using local provider");
                Ok(Arc::new(LocalStorageProvider::new(path.clone())))
            }
        }
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
