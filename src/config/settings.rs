//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on the multipart body accepted by `/generate`
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7860
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Synthesis engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// "echo" (in-process) or "http" (external inference worker)
    #[serde(default = "default_engine_kind")]
    pub kind: String,
    /// Base URL of the inference worker, required for the http engine
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_engine_timeout")]
    pub timeout_ms: u64,
    /// Directory holding `<ControlType>.safetensors` adapter files
    #[serde(default = "default_adapter_dir")]
    pub adapter_dir: String,
    #[serde(default = "default_cond_size")]
    pub cond_size: u32,
    #[serde(default = "default_lora_weight")]
    pub lora_weight: f32,
}

fn default_engine_kind() -> String {
    "echo".to_string()
}

fn default_engine_timeout() -> u64 {
    300_000
}

fn default_adapter_dir() -> String {
    "../models".to_string()
}

fn default_cond_size() -> u32 {
    512
}

fn default_lora_weight() -> f32 {
    1.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: default_engine_kind(),
            endpoint: None,
            timeout_ms: default_engine_timeout(),
            adapter_dir: default_adapter_dir(),
            cond_size: default_cond_size(),
            lora_weight: default_lora_weight(),
        }
    }
}

/// Admission control around the shared engine
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// Requests allowed inside the engine at once.
    ///
    /// Values above 1 let one request's cache reset land in the middle of
    /// another request's synthesis; only raise it for engines that keep
    /// per-call state isolated.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Requests admitted (running or waiting) before new ones are rejected
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    /// How long an admitted request may wait for the engine
    #[serde(default = "default_queue_timeout")]
    pub queue_timeout_ms: u64,
}

fn default_max_concurrent() -> usize {
    1
}

fn default_max_pending() -> usize {
    8
}

fn default_queue_timeout() -> u64 {
    120_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_pending: default_max_pending(),
            queue_timeout_ms: default_queue_timeout(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_rps() -> u32 {
    2
}

fn default_burst() -> u32 {
    4
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: default_rps(),
            burst_size: default_burst(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Settings used by the `ghibli-client` binary
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_client_timeout")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:7860".to_string()
}

fn default_client_timeout() -> u64 {
    60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_client_timeout(),
        }
    }
}

/// Settings used by the `ghibli-health` binary
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default = "default_health_url")]
    pub health_url: String,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

fn default_health_url() -> String {
    "http://localhost:7860/health".to_string()
}

fn default_probe_timeout() -> u64 {
    10
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            health_url: default_health_url(),
            timeout_secs: default_probe_timeout(),
        }
    }
}

impl Settings {
    /// Load settings from `GHIBLI_CONFIG` (or `config/default.toml`) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::config_path())
    }

    /// `GHIBLI_CONFIG`, or `config/default.toml` when unset
    pub fn config_path() -> PathBuf {
        std::env::var_os("GHIBLI_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config/default.toml"))
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("engine.kind", default_engine_kind())?
            .set_default("engine.adapter_dir", default_adapter_dir())?
            // Load from configuration file
            .add_source(File::from(path).required(false))
            // Override with environment variables, e.g. GHIBLI_SERVER__PORT
            .add_source(
                Environment::with_prefix("GHIBLI")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        if self.executor.max_concurrent == 0 {
            return Err(invalid("executor.max_concurrent must be at least 1"));
        }
        if self.executor.max_pending < self.executor.max_concurrent {
            return Err(invalid(
                "executor.max_pending cannot be smaller than executor.max_concurrent",
            ));
        }

        if self.engine.adapter_dir.trim().is_empty() {
            return Err(invalid("engine.adapter_dir cannot be empty"));
        }
        match self.engine.kind.as_str() {
            "echo" => {}
            "http" => {
                if self.engine.endpoint.as_deref().map_or(true, |e| e.trim().is_empty()) {
                    return Err(invalid("engine.endpoint is required when engine.kind is 'http'"));
                }
            }
            other => {
                return Err(invalid(&format!(
                    "Invalid engine kind '{}'. Must be 'echo' or 'http'",
                    other
                )));
            }
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err(invalid(&format!(
                "Invalid log format '{}'. Must be 'json' or 'pretty'",
                self.logging.format
            )));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> AppError {
    AppError::Config(config::ConfigError::Message(message.to_string()))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            engine: EngineConfig::default(),
            executor: ExecutorConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
            client: ClientConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}
