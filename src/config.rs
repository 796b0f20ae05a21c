//! Service configuration.
//!
//! Defaults, optionally overlaid with a YAML file, optionally overlaid
//! with `RENDR_*` environment variables (double underscore for nesting,
//! e.g. `RENDR_WEBHOOKS__RETRY_ATTEMPTS=5`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to bind the HTTP server to
    pub host: String,
    pub port: u16,
    /// Directory completed result files are written to
    pub results_dir: PathBuf,
    /// Per-key request budget per 60 second window
    pub rate_limit_per_minute: u32,
    /// Ceiling on a single result file's size in bytes
    pub max_result_bytes: u64,
    /// Capacity of the in-process work queue
    pub queue_capacity: usize,
    /// Generate and log a usable API key at startup (development only)
    pub bootstrap_api_key: bool,
    pub webhooks: WebhookConfig,
    pub wait: WaitConfig,
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Total delivery attempts per webhook, including the first
    pub retry_attempts: u32,
    /// First retry delay in milliseconds; doubles per attempt
    pub base_backoff_ms: u64,
    /// Per-attempt HTTP timeout in seconds
    pub delivery_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// How long a synchronous conversion request blocks before
    /// degrading to 202 + poll
    pub deadline_ms: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub min_sources: usize,
    pub max_sources: usize,
    /// Ceiling on the combined size of merge source files in bytes
    pub max_total_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3200,
            results_dir: PathBuf::from("./results"),
            rate_limit_per_minute: 60,
            max_result_bytes: 100 * 1024 * 1024,
            queue_capacity: 1024,
            bootstrap_api_key: false,
            webhooks: WebhookConfig::default(),
            wait: WaitConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            base_backoff_ms: 1000,
            delivery_timeout_secs: 10,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 8000,
            poll_interval_ms: 500,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            min_sources: 2,
            max_sources: 50,
            max_total_bytes: 500 * 1024 * 1024,
        }
    }
}

impl WebhookConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}

impl WaitConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration: defaults, then the YAML file if given, then
    /// `RENDR_*` environment variables.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed("RENDR_").split("__"))
            .extract()?;
        Ok(config)
    }
}
