//! Point-in-time health probe for a running service

use chrono::Local;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::config::{ProbeConfig, Settings};
use crate::error::{AppError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Why a probe reported the service offline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    /// Connect failure, timeout or non-2xx status
    NetworkError,
    /// 2xx response whose body was not a JSON object
    InvalidResponse,
}

impl ProbeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeErrorKind::NetworkError => "network_error",
            ProbeErrorKind::InvalidResponse => "invalid_response",
        }
    }
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HealthDetail {
    Online {
        status: String,
        model_loaded: bool,
    },
    Offline {
        error_type: ProbeErrorKind,
        error_message: String,
    },
}

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub online: bool,
    #[serde(flatten)]
    pub detail: HealthDetail,
    pub timestamp: String,
}

impl HealthReport {
    pub fn online(status: impl Into<String>, model_loaded: bool) -> Self {
        Self {
            online: true,
            detail: HealthDetail::Online {
                status: status.into(),
                model_loaded,
            },
            timestamp: now(),
        }
    }

    pub fn offline(error_type: ProbeErrorKind, error_message: impl Into<String>) -> Self {
        Self {
            online: false,
            detail: HealthDetail::Offline {
                error_type,
                error_message: error_message.into(),
            },
            timestamp: now(),
        }
    }

    pub fn error_type(&self) -> Option<ProbeErrorKind> {
        match &self.detail {
            HealthDetail::Offline { error_type, .. } => Some(*error_type),
            HealthDetail::Online { .. } => None,
        }
    }

    /// Interpret a 2xx body
    fn from_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(fields)) => {
                let status = fields
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let model_loaded = fields
                    .get("model_loaded")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                Self::online(status, model_loaded)
            }
            _ => Self::offline(ProbeErrorKind::InvalidResponse, "Received non-JSON response"),
        }
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            HealthDetail::Online {
                status,
                model_loaded,
            } => {
                writeln!(f, "[✅] Service online (Check time: {})", self.timestamp)?;
                writeln!(f, "    - Status: {}", status.to_uppercase())?;
                write!(
                    f,
                    "    - Model loaded: {}",
                    if *model_loaded { "Success" } else { "Failed" }
                )
            }
            HealthDetail::Offline {
                error_type,
                error_message,
            } => {
                writeln!(f, "[❌] Service unreachable (Check time: {})", self.timestamp)?;
                writeln!(f, "    Error type: {}", error_type)?;
                write!(f, "    Error message: {}", error_message)
            }
        }
    }
}

fn now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Issues a single GET against the health endpoint; no retries
#[derive(Debug, Clone)]
pub struct HealthProber {
    http: Client,
    url: String,
}

impl HealthProber {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    pub fn from_config(config: &ProbeConfig) -> Result<Self> {
        Self::new(&config.health_url, Duration::from_secs(config.timeout_secs))
    }

    /// Probe once. Never fails: problems become an offline report.
    pub async fn check(&self) -> HealthReport {
        debug!(url = %self.url, "Probing service health");

        let response = match self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(response) => response,
            Err(e) => return HealthReport::offline(ProbeErrorKind::NetworkError, e.to_string()),
        };

        match response.text().await {
            Ok(body) => HealthReport::from_body(&body),
            Err(e) => HealthReport::offline(ProbeErrorKind::NetworkError, e.to_string()),
        }
    }
}

/// Run `ghibli-health` once and return the text to print.
///
/// Setup problems (unreadable config, client construction) are reported as
/// text rather than returned.
pub async fn run(config_path: &Path) -> String {
    match Settings::load_from_path(config_path)
        .and_then(|settings| HealthProber::from_config(&settings.probe))
    {
        Ok(prober) => prober.check().await.to_string(),
        Err(e) => format!("🛑 {}", e),
    }
}
