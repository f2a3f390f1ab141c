use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = &ctx.state;
        let mut lines = Vec::new();

        // 1. Config
        lines.push("Config:".to_string());
        lines.push(format!("  directory:   {}", state.rebucket_dir.display()));
        if state.is_initialized() {
            lines.push("  config.toml: OK".to_string());
        } else {
            lines.push("  config.toml: MISSING (using defaults)".to_string());
        }
        lines.push(format!("  region:      {}", state.config.region));

        // 2. Provider session
        lines.push(String::new());
        lines.push("Provider:".to_string());
        let provider = match ctx.provider(None).await {
            Ok(provider) => provider,
            Err(e) => {
                lines.push(format!("  setup:    FAILED ({:#})", e));
                return Err(HealthError::Failed(lines.join("\n")));
            }
        };
        match provider.verify_identity().await {
            Ok(identity) => {
                lines.push(format!("  kind:      {}", identity.provider));
                lines.push(format!("  principal: {}", identity.principal));
                if let Some(region) = identity.region {
                    lines.push(format!("  region:    {}", region));
                }
                lines.push("  identity:  OK".to_string());
            }
            Err(e) => {
                lines.push(format!("  identity:  FAILED ({})", e));
                return Err(HealthError::Failed(lines.join("\n")));
            }
        }

        Ok(lines.join("\n"))
    }
}
