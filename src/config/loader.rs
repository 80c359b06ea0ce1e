//! Configuration Loader
//!
//! Environment-aware layering of defaults, TOML files and environment variables.

use super::TagBatchConfig;
use crate::error::Result;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const CONFIG_FILE_STEM: &str = "tagbatch";
pub const ENV_PREFIX: &str = "TAGBATCH";

/// Loaded configuration plus the environment and directory it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: TagBatchConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> Result<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> Result<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> Result<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            provider = %config.provider.provider,
            model = %config.provider.model,
            batch_limit = config.recovery.batch_limit,
            stale_minutes = config.recovery.stale_minutes,
            api_key_configured = config.provider.api_key.is_some(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    pub fn config(&self) -> &TagBatchConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// `TAGBATCH_ENV`, then `APP_ENV`, default `development`
    pub fn detect_environment() -> String {
        env::var("TAGBATCH_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn load_and_merge_config(config_directory: &Path, environment: &str) -> Result<TagBatchConfig> {
        let base = config_directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let overlay = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

        for path in [&base, &overlay] {
            if path.exists() {
                debug!("Merging configuration file: {}", path.display());
            }
        }

        let merged = Config::builder()
            .add_source(Config::try_from(&TagBatchConfig::default())?)
            .add_source(File::from(base).required(false))
            .add_source(File::from(overlay).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(merged.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_empty_directory_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();

        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().recovery, TagBatchConfig::default().recovery);
    }

    #[test]
    fn test_environment_file_overrides_base() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("tagbatch.toml"),
            r#"
[provider]
provider = "groq"
model = "llama-3.1-8b-instant"

[recovery]
batch_limit = 50
stale_minutes = 30
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("tagbatch.test.toml"),
            r#"
[recovery]
stale_minutes = 0

[apply]
tag_language = "german"
"#,
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        let config = manager.config();

        assert_eq!(config.provider.provider, "groq");
        assert_eq!(config.provider.base_url, crate::constants::defaults::PROVIDER_BASE_URL);
        assert_eq!(config.recovery.batch_limit, 50);
        assert_eq!(config.recovery.stale_minutes, 0);
        assert_eq!(config.apply.tag_language, "german");
    }

    #[test]
    fn test_invalid_file_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("tagbatch.toml"),
            "[recovery]\nmax_concurrency = 0\n",
        )
        .unwrap();

        let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
            .unwrap_err();
        assert!(err.is_configuration_error());
    }
}
