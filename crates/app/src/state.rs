use std::collections::BTreeMap;
use std::time::Duration;
use std::{fs, path::PathBuf};

use common::prelude::{ConsistencyConfig, FacetSelection, MigrationConfig, NamingPolicy};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "rebucket";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Region new buckets are created in
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket pipelines run at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Object copies in flight per bucket
    #[serde(default = "default_object_concurrency")]
    pub object_concurrency: usize,
    #[serde(default = "default_copy_attempts")]
    pub copy_attempts: u32,
    #[serde(default = "default_copy_backoff_ms")]
    pub copy_backoff_ms: u64,
    #[serde(default = "default_true")]
    pub copy_lifecycle: bool,
    #[serde(default = "default_true")]
    pub copy_cors: bool,
    /// Default log level; RUST_LOG overrides it
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Also write daily-rotated logs here
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub naming: NamingPolicy,
    #[serde(default)]
    pub consistency: ConsistencySection,
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Tags merged into every target bucket
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_object_concurrency() -> usize {
    8
}

fn default_copy_attempts() -> u32 {
    3
}

fn default_copy_backoff_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            concurrency: default_concurrency(),
            object_concurrency: default_object_concurrency(),
            copy_attempts: default_copy_attempts(),
            copy_backoff_ms: default_copy_backoff_ms(),
            copy_lifecycle: true,
            copy_cors: true,
            log_level: default_log_level(),
            log_dir: None,
            naming: NamingPolicy::default(),
            consistency: ConsistencySection::default(),
            provider: ProviderConfig::default(),
            tags: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        self.log_level
            .parse()
            .map_err(|_| StateError::InvalidLogLevel(self.log_level.clone()))
    }

    pub fn facet_selection(&self) -> FacetSelection {
        FacetSelection {
            lifecycle: self.copy_lifecycle,
            cors: self.copy_cors,
        }
    }

    pub fn migration_config(&self) -> MigrationConfig {
        MigrationConfig {
            concurrency: self.concurrency,
            object_concurrency: self.object_concurrency,
            copy_attempts: self.copy_attempts,
            copy_backoff: Duration::from_millis(self.copy_backoff_ms),
            consistency: self.consistency.to_config(),
        }
    }
}

/// Backoff used while a new bucket becomes visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencySection {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for ConsistencySection {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ConsistencySection {
    pub fn to_config(&self) -> ConsistencyConfig {
        ConsistencyConfig {
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Which storage service buckets live in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// AWS S3 or an S3-compatible endpoint; credentials come from the
    /// default AWS chain
    S3 {
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        profile: Option<String>,
        #[serde(default)]
        force_path_style: bool,
    },
    /// Buckets are directories under `path`
    Local { path: PathBuf },
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::S3 {
            endpoint: None,
            profile: None,
            force_path_style: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the rebucket directory (~/.rebucket)
    pub rebucket_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the rebucket directory path (custom or default ~/.rebucket)
    pub fn rebucket_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Write a fresh config file
    pub fn init(custom_path: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let rebucket_dir = Self::rebucket_dir(custom_path)?;
        let config_path = rebucket_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            return Err(StateError::AlreadyInitialized(config_path));
        }

        fs::create_dir_all(&rebucket_dir)?;

        let config = config.unwrap_or_default();
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            rebucket_dir,
            config_path,
            config,
        })
    }

    /// Load the config file, falling back to defaults when there is none
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let rebucket_dir = Self::rebucket_dir(custom_path)?;
        let config_path = rebucket_dir.join(CONFIG_FILE_NAME);

        let config = if config_path.exists() {
            let config_toml = fs::read_to_string(&config_path)?;
            toml::from_str(&config_toml)?
        } else {
            AppConfig::default()
        };

        Ok(Self {
            rebucket_dir,
            config_path,
            config,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.config_path.exists()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("config already exists at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_without_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::load(Some(dir.path().to_path_buf())).unwrap();
        assert!(!state.is_initialized());
        assert_eq!(state.config, AppConfig::default());
    }

    #[test]
    fn test_init_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = Some(dir.path().join("nested"));

        let mut config = AppConfig::default();
        config.region = "eu-west-1".to_string();
        config.provider = ProviderConfig::Local {
            path: PathBuf::from("/srv/buckets"),
        };
        config
            .tags
            .insert("team".to_string(), "storage".to_string());

        AppState::init(path.clone(), Some(config.clone())).unwrap();
        let loaded = AppState::load(path.clone()).unwrap();
        assert!(loaded.is_initialized());
        assert_eq!(loaded.config, config);

        assert!(matches!(
            AppState::init(path, None),
            Err(StateError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            region = "ap-south-1"
            copy_cors = false

            [naming]
            substitute = "x"

            [provider]
            type = "s3"
            endpoint = "http://localhost:9000"
            force_path_style = true

            [consistency]
            timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.region, "ap-south-1");
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.naming.separator, '.');
        assert_eq!(config.naming.substitute, 'x');
        assert!(!config.facet_selection().cors);
        assert!(config.facet_selection().lifecycle);
        assert_eq!(
            config.migration_config().consistency.timeout,
            Duration::from_secs(5)
        );
        assert!(matches!(
            config.provider,
            ProviderConfig::S3 {
                force_path_style: true,
                ..
            }
        ));
    }

    #[test]
    fn test_log_level_parsing() {
        let mut config = AppConfig::default();
        assert_eq!(config.log_level().unwrap(), tracing::Level::INFO);
        config.log_level = "loud".to_string();
        assert!(matches!(
            config.log_level(),
            Err(StateError::InvalidLogLevel(_))
        ));
    }
}
