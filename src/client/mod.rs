//! Client for the `/generate` endpoint

pub mod args;

use reqwest::{
    multipart::{Form, Part},
    Client, StatusCode,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::api::handlers::{IMAGE_FIELD, REQUEST_FIELD};
use crate::api::schemas::GenerationRequest;
use crate::config::{ClientConfig, Settings};
use crate::error::{AppError, Result};

pub use args::{parse_args, ClientArgs, Overrides};

/// Default request parameters as a JSON object
pub fn default_payload() -> Map<String, Value> {
    match serde_json::to_value(GenerationRequest::default()) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Default parameters with `overrides` merged on top
pub fn build_payload(overrides: &Overrides) -> Value {
    let mut payload = default_payload();
    overrides.apply(&mut payload);
    Value::Object(payload)
}

/// How a single generation attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// Image written to `path`
    Saved { path: PathBuf, bytes: usize },
    /// Non-200 response with a JSON error body
    Rejected { status: u16, detail: Value },
    /// Non-200 response whose body was not JSON
    InvalidJson { status: u16 },
    /// Transport failure (connect, timeout, ...)
    Network(String),
    /// Input image unreadable or output not writable
    File(String),
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationOutcome::Saved { .. })
    }

    /// Lines printed by the CLI
    pub fn report(&self) -> Vec<String> {
        match self {
            GenerationOutcome::Saved { path, bytes } => vec![
                "✅ Generation successful!".to_string(),
                format!("    Saved {} bytes to {}", bytes, path.display()),
            ],
            GenerationOutcome::Rejected { status, detail } => vec![
                format!("❌ Error code {}", status),
                format!("Detailed error: {}", detail),
            ],
            GenerationOutcome::InvalidJson { status } => vec![
                format!("❌ Error code {}", status),
                "🛑 Invalid JSON response".to_string(),
            ],
            GenerationOutcome::Network(message) => {
                vec![format!("🛑 Network error: {}", message)]
            }
            GenerationOutcome::File(message) => vec![format!("🛑 File error: {}", message)],
        }
    }
}

/// Sends one multipart generation request per call; no retries
#[derive(Debug, Clone)]
pub struct GenerationClient {
    http: Client,
    api_url: String,
}

impl GenerationClient {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.api_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn generate_url(&self) -> String {
        format!("{}/generate", self.api_url)
    }

    /// Upload `image_path` with the merged parameters and save the result.
    ///
    /// Every failure is folded into the returned outcome.
    pub async fn send_generation_request(
        &self,
        image_path: &Path,
        output_path: &Path,
        overrides: &Overrides,
    ) -> GenerationOutcome {
        let image = match tokio::fs::read(image_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return GenerationOutcome::File(format!(
                    "cannot read {}: {}",
                    image_path.display(),
                    e
                ))
            }
        };

        let file_name = image_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image.png")
            .to_string();
        let payload = build_payload(overrides);

        let form = match build_form(payload.to_string(), image, file_name) {
            Ok(form) => form,
            Err(e) => return GenerationOutcome::Network(e.to_string()),
        };

        let url = self.generate_url();
        debug!(url = %url, payload = %payload, "Sending generation request");

        let response = match self.http.post(&url).multipart(form).send().await {
            Ok(response) => response,
            Err(e) => return GenerationOutcome::Network(e.to_string()),
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return GenerationOutcome::Network(e.to_string()),
        };

        if status == StatusCode::OK {
            return match tokio::fs::write(output_path, &body).await {
                Ok(()) => GenerationOutcome::Saved {
                    path: output_path.to_path_buf(),
                    bytes: body.len(),
                },
                Err(e) => GenerationOutcome::File(format!(
                    "cannot write {}: {}",
                    output_path.display(),
                    e
                )),
            };
        }

        match serde_json::from_slice::<Value>(&body) {
            Ok(detail) => GenerationOutcome::Rejected {
                status: status.as_u16(),
                detail,
            },
            Err(_) => GenerationOutcome::InvalidJson {
                status: status.as_u16(),
            },
        }
    }
}

/// Run `ghibli-client` end to end and return the lines to print.
///
/// Bad arguments, an unreadable config file and every request failure all end
/// up as output lines.
pub async fn run<I, S>(args: I, config_path: &Path) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args = match parse_args(args) {
        Ok(args) => args,
        Err(usage) => return vec![usage],
    };

    let client = match Settings::load_from_path(config_path)
        .and_then(|settings| GenerationClient::from_config(&settings.client))
    {
        Ok(client) => client,
        Err(e) => return vec![format!("🛑 {}", e)],
    };

    client
        .send_generation_request(&args.image_path, &args.output_path, &args.overrides)
        .await
        .report()
}

fn build_form(request_json: String, image: Vec<u8>, file_name: String) -> reqwest::Result<Form> {
    let request_part = Part::text(request_json)
        .file_name(REQUEST_FIELD)
        .mime_str("application/json")?;
    let image_part = Part::bytes(image).file_name(file_name).mime_str("image/png")?;

    Ok(Form::new()
        .part(REQUEST_FIELD, request_part)
        .part(IMAGE_FIELD, image_part))
}
