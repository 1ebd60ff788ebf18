use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use url::Url;

use crate::endpoints::{EndpointRegistry, Operation};
use crate::errors::{OrchestratorError, Result};

/// Everything the orchestrator needs to reach the workflow engine.
///
/// The library never reads this from the environment itself; the binary (or
/// any other caller) resolves it and hands it over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// e.g. `https://flows.example.com`. Webhooks live under `{base_url}/webhook/`.
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Total attempts per call, the first one included.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Retry budget given to each queued operation.
    #[serde(default = "default_queue_max_retries")]
    pub queue_max_retries: u32,
    /// Pause applied to the drain loop after an operation is re-queued.
    #[serde(default = "default_queue_retry_delay_ms")]
    pub queue_retry_delay_ms: u64,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_health_window")]
    pub health_window: usize,
    #[serde(default = "default_health_threshold")]
    pub health_threshold: f64,
    /// Per-operation path overrides.
    #[serde(default)]
    pub endpoints: HashMap<Operation, String>,
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_queue_max_retries() -> u32 {
    3
}
fn default_queue_retry_delay_ms() -> u64 {
    5_000
}
fn default_max_queue_size() -> usize {
    1_000
}
fn default_health_window() -> usize {
    100
}
fn default_health_threshold() -> f64 {
    0.9
}

impl WebhookConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            queue_max_retries: default_queue_max_retries(),
            queue_retry_delay_ms: default_queue_retry_delay_ms(),
            max_queue_size: default_max_queue_size(),
            health_window: default_health_window(),
            health_threshold: default_health_threshold(),
            endpoints: HashMap::new(),
        }
    }

    /// Parsed base URL. Only http(s) is accepted.
    pub fn base_url(&self) -> Result<Url> {
        let raw = self.base_url.trim();
        if raw.is_empty() {
            return Err(OrchestratorError::config("base URL is required"));
        }
        let url = Url::parse(raw)
            .map_err(|e| OrchestratorError::config(format!("invalid base URL '{}': {}", raw, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(OrchestratorError::config(format!(
                "base URL must use http or https, got '{}'",
                other
            ))),
        }
    }

    /// API key, ignoring blank values.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn registry(&self) -> Result<EndpointRegistry> {
        EndpointRegistry::with_overrides(&self.endpoints)
    }

    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        self.registry()?;
        if self.timeout_ms == 0 {
            return Err(OrchestratorError::config("timeout_ms must be greater than 0"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(OrchestratorError::config(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_queue_size == 0 {
            return Err(OrchestratorError::config("max_queue_size must be greater than 0"));
        }
        if self.health_window == 0 {
            return Err(OrchestratorError::config("health_window must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.health_threshold) {
            return Err(OrchestratorError::config(format!(
                "health_threshold must be within [0, 1], got {}",
                self.health_threshold
            )));
        }
        Ok(())
    }
}

/// Load configuration from `HOOKLINE_*` environment variables (and `.env`).
pub fn load() -> anyhow::Result<WebhookConfig> {
    dotenvy::dotenv().ok();

    let base_url = std::env::var("HOOKLINE_BASE_URL")
        .map_err(|_| anyhow::anyhow!("HOOKLINE_BASE_URL is not set"))?;

    let mut cfg = WebhookConfig::new(base_url);
    cfg.api_key = std::env::var("HOOKLINE_API_KEY").ok();
    cfg.timeout_ms = env_or("HOOKLINE_TIMEOUT_MS", cfg.timeout_ms);
    cfg.max_retries = env_or("HOOKLINE_MAX_RETRIES", cfg.max_retries);
    cfg.base_delay_ms = env_or("HOOKLINE_BASE_DELAY_MS", cfg.base_delay_ms);
    cfg.backoff_multiplier = env_or("HOOKLINE_BACKOFF_MULTIPLIER", cfg.backoff_multiplier);
    cfg.max_delay_ms = env_or("HOOKLINE_MAX_DELAY_MS", cfg.max_delay_ms);
    cfg.queue_max_retries = env_or("HOOKLINE_QUEUE_MAX_RETRIES", cfg.queue_max_retries);
    cfg.queue_retry_delay_ms = env_or("HOOKLINE_QUEUE_RETRY_DELAY_MS", cfg.queue_retry_delay_ms);
    cfg.max_queue_size = env_or("HOOKLINE_MAX_QUEUE_SIZE", cfg.max_queue_size);

    cfg.validate()?;
    Ok(cfg)
}

/// Load configuration from a YAML file.
pub fn from_yaml_file(path: &Path) -> anyhow::Result<WebhookConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = from_yaml_str(&raw)?;
    Ok(cfg)
}

pub fn from_yaml_str(raw: &str) -> anyhow::Result<WebhookConfig> {
    let cfg: WebhookConfig = serde_yaml::from_str(raw)?;
    cfg.validate()?;
    Ok(cfg)
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
