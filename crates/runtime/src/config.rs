//! Worker configuration, with environment overrides.

use std::env;
use std::time::Duration;

use tracing::warn;

use reify_core::SudoPolicy;
use reify_observability::LogFormat;

use crate::scanner::RepositoryCommandSource;

pub const ENV_WORKER_NAME: &str = "REIFY_WORKER_NAME";
pub const ENV_POLL_INTERVAL_MS: &str = "REIFY_POLL_INTERVAL_MS";
pub const ENV_BATCH_SIZE: &str = "REIFY_BATCH_SIZE";
pub const ENV_SUDO_POLICY: &str = "REIFY_SUDO_POLICY";
pub const ENV_LOG_FORMAT: &str = "REIFY_LOG_FORMAT";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Background worker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Thread name, also used in logs
    pub name: String,
    /// Pause between scans when nothing was due
    pub poll_interval: Duration,
    /// Maximum commands picked up per scan
    pub batch_size: usize,
    pub sudo_policy: SudoPolicy,
    pub log_format: LogFormat,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "background-worker".to_string(),
            poll_interval: Duration::from_millis(250),
            batch_size: RepositoryCommandSource::DEFAULT_BATCH_SIZE,
            sudo_policy: SudoPolicy::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_sudo_policy(mut self, policy: SudoPolicy) -> Self {
        self.sudo_policy = policy;
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Defaults overridden by the `REIFY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_WORKER_NAME) {
            let name = name.trim();
            if name.is_empty() {
                return Err(ConfigError::invalid(ENV_WORKER_NAME, name, "must not be empty"));
            }
            config.name = name.to_string();
        }

        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| ConfigError::invalid(ENV_POLL_INTERVAL_MS, &raw, e.to_string()))?;
            if millis == 0 {
                warn!(key = ENV_POLL_INTERVAL_MS, "poll interval of 0 busy-loops when idle");
            }
            config.poll_interval = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            let size: usize = raw
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| ConfigError::invalid(ENV_BATCH_SIZE, &raw, e.to_string()))?;
            if size == 0 {
                return Err(ConfigError::invalid(ENV_BATCH_SIZE, &raw, "must be at least 1"));
            }
            config.batch_size = size;
        }

        if let Some(raw) = lookup(ENV_SUDO_POLICY) {
            config.sudo_policy = match raw.trim().to_ascii_lowercase().as_str() {
                "switch" => SudoPolicy::Switch,
                "no_switch" => SudoPolicy::NoSwitch,
                _ => {
                    return Err(ConfigError::invalid(
                        ENV_SUDO_POLICY,
                        &raw,
                        "expected 'switch' or 'no_switch'",
                    ));
                }
            };
        }

        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            config.log_format = raw
                .parse()
                .map_err(|e: reify_observability::UnknownLogFormat| {
                    ConfigError::invalid(ENV_LOG_FORMAT, &raw, e.to_string())
                })?;
        }

        Ok(config)
    }
}
