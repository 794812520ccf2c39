//! Layered configuration: programmatic defaults, an optional
//! `orchestrator.yaml` file, then environment variables (§1A, §6).
//!
//! A `figment::Figment` merge chain plus a `validate()` pass with an
//! enumerated `ConfigError`. The recognized keys here (§6) are flat,
//! upper-case names with no common prefix (`MAX_CONCURRENT_TASKS`,
//! `SORA_HK_API_KEY`, ...), so the environment layer merges with
//! `figment::providers::Env::raw()` against a flat `Config` struct.

use std::collections::HashMap;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::providers::ProviderWireConfig;
use crate::services::error_classifier::ErrorClassifier;
use crate::services::governor::GovernorConfig;
use crate::services::task_worker::WorkerConfig;

/// Process-wide configuration (§6). Every field has a default, so a fresh
/// process with no file and no environment is immediately usable (against
/// `MockProvider` clients, since no API key is configured).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_concurrent_tasks: u32,
    pub concurrency_min_tasks: u32,
    pub concurrency_error_threshold: u32,
    pub concurrency_cooldown_seconds: u64,
    pub concurrency_recovery_rate_seconds: u64,

    pub poll_initial_wait_seconds: u64,
    pub poll_interval_seconds: u64,
    pub max_poll_time: u64,
    pub api_request_timeout_seconds: u64,
    pub download_timeout_seconds: u64,

    pub failover_retryable_tokens: String,
    pub failover_non_retryable_tokens: String,

    pub log_level: String,
    pub log_format: String,
    /// Directory for an optional daily-rotating JSON log file, alongside the
    /// stdout layer. `None` (the default) disables file output entirely.
    pub log_dir: Option<String>,

    pub sora_hk_api_key: String,
    pub sora_hk_base_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub aihubmix_api_key: String,
    pub aihubmix_base_url: String,

    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 20,
            concurrency_min_tasks: 5,
            concurrency_error_threshold: 2,
            concurrency_cooldown_seconds: 600,
            concurrency_recovery_rate_seconds: 60,

            poll_initial_wait_seconds: 20,
            poll_interval_seconds: 10,
            max_poll_time: 2_100,
            api_request_timeout_seconds: 30,
            download_timeout_seconds: 300,

            failover_retryable_tokens: String::new(),
            failover_non_retryable_tokens: String::new(),

            log_level: "info".to_string(),
            log_format: "json".to_string(),
            log_dir: None,

            sora_hk_api_key: String::new(),
            sora_hk_base_url: "https://api.sora.hk".to_string(),
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com".to_string(),
            aihubmix_api_key: String::new(),
            aihubmix_base_url: "https://aihubmix.com".to_string(),

            http_proxy: None,
            https_proxy: None,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_concurrent_tasks must be at least 1")]
    InvalidMaxConcurrentTasks,
    #[error("concurrency_min_tasks ({0}) must not exceed max_concurrent_tasks ({1})")]
    InvalidMinTasks(u32, u32),
    #[error("concurrency_error_threshold must be at least 1")]
    InvalidErrorThreshold,
    #[error("log_level '{0}' is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),
    #[error("log_format '{0}' is not one of json, pretty")]
    InvalidLogFormat(String),
    #[error(transparent)]
    Figment(#[from] figment::Error),
}

/// Hierarchical loader: defaults -> `orchestrator.yaml` (if present) ->
/// environment variables (highest priority).
pub struct ConfigLoader;

impl ConfigLoader {
    /// # Errors
    /// Returns `ConfigError::Figment` if the YAML file is present but
    /// malformed, or a validation variant if the merged result is
    /// out of range.
    pub fn load() -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("orchestrator.yaml"))
            .merge(Env::raw())
            .extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// # Errors
    /// See [`ConfigLoader::load`].
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::raw())
            .extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// # Errors
    /// Returns the first out-of-range field found.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_concurrent_tasks == 0 {
            return Err(ConfigError::InvalidMaxConcurrentTasks);
        }
        if config.concurrency_min_tasks > config.max_concurrent_tasks {
            return Err(ConfigError::InvalidMinTasks(config.concurrency_min_tasks, config.max_concurrent_tasks));
        }
        if config.concurrency_error_threshold == 0 {
            return Err(ConfigError::InvalidErrorThreshold);
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.log_level.clone()));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.log_format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.log_format.clone()));
        }
        Ok(())
    }
}

impl Config {
    #[must_use]
    pub fn governor_config(&self) -> GovernorConfig {
        GovernorConfig {
            max_concurrency: self.max_concurrent_tasks,
            min_concurrency: self.concurrency_min_tasks,
            error_threshold: self.concurrency_error_threshold,
            cooldown: Duration::from_secs(self.concurrency_cooldown_seconds),
            recovery_rate: Duration::from_secs(self.concurrency_recovery_rate_seconds),
        }
    }

    #[must_use]
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_initial_wait: Duration::from_secs(self.poll_initial_wait_seconds),
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            max_poll_time: Duration::from_secs(self.max_poll_time),
            submit_attempts_per_candidate: 3,
        }
    }

    #[must_use]
    pub fn classifier(&self) -> ErrorClassifier {
        ErrorClassifier::new(&self.failover_non_retryable_tokens, &self.failover_retryable_tokens)
    }

    /// Per-provider wire settings, keyed by the built-in Provider catalog's
    /// ids (§9 "dynamic provider dispatch").
    #[must_use]
    pub fn provider_wire_configs(&self) -> HashMap<String, ProviderWireConfig> {
        let timeout = Duration::from_secs(self.api_request_timeout_seconds);
        let download_timeout = Duration::from_secs(self.download_timeout_seconds);
        HashMap::from([
            ("sora_hk".to_string(), ProviderWireConfig { base_url: self.sora_hk_base_url.clone(), api_key: self.sora_hk_api_key.clone(), request_timeout: timeout, download_timeout }),
            ("openai".to_string(), ProviderWireConfig { base_url: self.openai_base_url.clone(), api_key: self.openai_api_key.clone(), request_timeout: timeout, download_timeout }),
            ("aihubmix".to_string(), ProviderWireConfig { base_url: self.aihubmix_base_url.clone(), api_key: self.aihubmix_api_key.clone(), request_timeout: timeout, download_timeout }),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ConfigLoader::validate(&Config::default()).is_ok());
    }

    #[test]
    fn zero_max_concurrent_tasks_is_rejected() {
        let mut c = Config::default();
        c.max_concurrent_tasks = 0;
        assert!(matches!(ConfigLoader::validate(&c), Err(ConfigError::InvalidMaxConcurrentTasks)));
    }

    #[test]
    fn min_exceeding_max_is_rejected() {
        let mut c = Config::default();
        c.concurrency_min_tasks = 21;
        assert!(matches!(ConfigLoader::validate(&c), Err(ConfigError::InvalidMinTasks(21, 20))));
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let mut c = Config::default();
        c.log_level = "verbose".to_string();
        assert!(matches!(ConfigLoader::validate(&c), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let mut c = Config::default();
        c.log_format = "xml".to_string();
        assert!(matches!(ConfigLoader::validate(&c), Err(ConfigError::InvalidLogFormat(_))));
    }

    #[test]
    fn governor_config_derives_from_concurrency_fields() {
        let c = Config::default();
        let gov = c.governor_config();
        assert_eq!(gov.max_concurrency, 20);
        assert_eq!(gov.min_concurrency, 5);
        assert_eq!(gov.cooldown, Duration::from_secs(600));
    }

    #[test]
    fn load_from_file_merges_yaml_over_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("orchestrator.yaml");
        std::fs::write(&path, "max_concurrent_tasks: 7\nlog_format: pretty\n").unwrap();
        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.max_concurrent_tasks, 7);
        assert_eq!(config.log_format, "pretty");
        // Unset fields keep their defaults.
        assert_eq!(config.poll_interval_seconds, 10);
    }
}
