//! # Configuration
//!
//! Typed configuration for the recovery subsystem. Every section has defaults, so
//! an empty config directory yields a working development setup.
//!
//! Loading order (later wins), see [`ConfigManager`]:
//!
//! 1. built-in defaults
//! 2. `config/tagbatch.toml`
//! 3. `config/tagbatch.{environment}.toml`
//! 4. `TAGBATCH__SECTION__FIELD` environment variables

pub mod loader;

pub use crate::applier::ApplySettings;
pub use loader::ConfigManager;

use crate::constants::defaults;
use crate::error::{BatchError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagBatchConfig {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub recovery: RecoveryConfig,
    pub apply: ApplySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DATABASE_MAX_CONNECTIONS,
            acquire_timeout_seconds: defaults::DATABASE_ACQUIRE_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider name, e.g. `openai` or `groq`
    pub provider: String,
    pub base_url: String,
    /// Falls back to `{PROVIDER}_API_KEY` when unset
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Minimum spacing between requests; provider default when unset
    pub min_interval_ms: Option<u64>,
    pub max_rate_limit_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: defaults::PROVIDER.to_string(),
            base_url: defaults::PROVIDER_BASE_URL.to_string(),
            api_key: None,
            model: defaults::MODEL.to_string(),
            request_timeout_ms: defaults::REQUEST_TIMEOUT_MS,
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            min_interval_ms: None,
            max_rate_limit_retries: defaults::MAX_RATE_LIMIT_RETRIES,
        }
    }
}

impl ProviderConfig {
    /// Configured key, else the provider-specific environment variable
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .or_else(|| {
                let var = format!("{}_API_KEY", self.provider.trim().to_uppercase());
                std::env::var(var).ok().filter(|key| !key.trim().is_empty())
            })
    }

    pub fn effective_min_interval(&self) -> Duration {
        let millis = self.min_interval_ms.unwrap_or_else(|| {
            if self.provider.eq_ignore_ascii_case("groq") {
                defaults::GROQ_MIN_INTERVAL_MS
            } else {
                defaults::MIN_INTERVAL_MS
            }
        });
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Candidates inspected per cycle
    pub batch_limit: i64,
    /// Heartbeat age after which a lease is abandoned; `0` reclaims every lease
    pub stale_minutes: i64,
    pub max_concurrency: usize,
    pub job_timeout_seconds: u64,
    pub cycle_interval_seconds: u64,
    /// Lease owner identity; generated when unset
    pub worker_id: Option<String>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            batch_limit: defaults::BATCH_LIMIT,
            stale_minutes: defaults::STALE_MINUTES,
            max_concurrency: defaults::MAX_CONCURRENCY,
            job_timeout_seconds: defaults::JOB_TIMEOUT_SECONDS,
            cycle_interval_seconds: defaults::CYCLE_INTERVAL_SECONDS,
            worker_id: None,
        }
    }
}

impl RecoveryConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_seconds)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_seconds)
    }

    /// Configured worker id, else `{host}-{pid}-{uuid}`
    pub fn resolved_worker_id(&self) -> String {
        self.worker_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
                format!("{host}-{}-{}", std::process::id(), uuid::Uuid::new_v4())
            })
    }
}

impl TagBatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(invalid("database.url", "must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections", "must be greater than 0"));
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(invalid("provider.base_url", "must not be empty"));
        }
        if self.provider.request_timeout_ms == 0 {
            return Err(invalid("provider.request_timeout_ms", "must be greater than 0"));
        }
        if self.recovery.batch_limit <= 0 {
            return Err(invalid("recovery.batch_limit", "must be greater than 0"));
        }
        if self.recovery.stale_minutes < 0 {
            return Err(invalid("recovery.stale_minutes", "must not be negative"));
        }
        if self.recovery.max_concurrency == 0 {
            return Err(invalid("recovery.max_concurrency", "must be greater than 0"));
        }
        if self.recovery.job_timeout_seconds == 0 {
            return Err(invalid("recovery.job_timeout_seconds", "must be greater than 0"));
        }
        if self.apply.tag_language.trim().is_empty() {
            return Err(invalid("apply.tag_language", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> BatchError {
    BatchError::ConfigurationError(format!("{field} {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TagBatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recovery.stale_minutes, 15);
        assert_eq!(config.apply.tag_language, "english");
    }

    #[test]
    fn test_validation_failures() {
        let mut config = TagBatchConfig::default();
        config.recovery.stale_minutes = -1;
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("recovery.stale_minutes"));

        let mut config = TagBatchConfig::default();
        config.recovery.batch_limit = 0;
        assert!(config.validate().is_err());

        // Zero stale minutes is the forced-reclaim setting, not an error
        let mut config = TagBatchConfig::default();
        config.recovery.stale_minutes = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_interval_defaults_per_provider() {
        let mut provider = ProviderConfig::default();
        assert_eq!(provider.effective_min_interval(), Duration::from_millis(500));

        provider.provider = "Groq".to_string();
        assert_eq!(provider.effective_min_interval(), Duration::from_secs(2));

        provider.min_interval_ms = Some(0);
        assert_eq!(provider.effective_min_interval(), Duration::ZERO);
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let provider = ProviderConfig {
            provider: "tagbatch-test-provider".to_string(),
            api_key: Some("  sk-explicit ".to_string()),
            ..ProviderConfig::default()
        };
        assert_eq!(provider.resolved_api_key().as_deref(), Some("sk-explicit"));
    }

    #[test]
    fn test_configured_worker_id_is_used() {
        let recovery = RecoveryConfig {
            worker_id: Some("worker-7".to_string()),
            ..RecoveryConfig::default()
        };
        assert_eq!(recovery.resolved_worker_id(), "worker-7");

        let generated = RecoveryConfig::default().resolved_worker_id();
        assert!(generated.contains(&format!("-{}-", std::process::id())));
    }
}
