//! HTTP client for an out-of-process inference worker

use async_trait::async_trait;
use image::RgbImage;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::traits::{AdapterSpec, SynthesisEngine, SynthesisJob};
use crate::error::{AppError, Result};
use crate::response::{base64, png};

/// Engine backed by a worker process that hosts the pretrained pipeline
pub struct HttpEngine {
    name: String,
    client: Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct ApiAdapterRequest<'a> {
    path: String,
    weights: &'a [f32],
    cond_size: u32,
}

#[derive(Debug, Serialize)]
struct ApiSynthesizeRequest<'a> {
    prompt: &'a str,
    height: u32,
    width: u32,
    guidance_scale: f32,
    num_inference_steps: u32,
    max_sequence_length: u32,
    seed: u64,
    spatial_images: Vec<String>,
    subject_images: Vec<String>,
    cond_size: u32,
}

#[derive(Debug, Deserialize)]
struct ApiSynthesizeResponse {
    #[serde(default, alias = "image_base64")]
    image: Option<String>,
    #[serde(default)]
    images: Vec<String>,
}

impl HttpEngine {
    /// Create a new HTTP engine from configuration
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| AppError::Internal("http engine requires an endpoint".to_string()))?;
        Self::with_endpoint(endpoint, Duration::from_millis(config.timeout_ms))
    }

    pub fn with_endpoint(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: "http".to_string(),
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.endpoint, path);
        debug!(engine = %self.name, url = %url, "Sending engine request");

        self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_connect() || e.is_timeout() {
            AppError::ResourceUnavailable(format!(
                "inference worker unreachable at {}: {}",
                self.endpoint, e
            ))
        } else {
            AppError::HttpClient(e)
        }
    }
}

#[async_trait]
impl SynthesisEngine for HttpEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load_adapter(&self, adapter: &AdapterSpec) -> Result<()> {
        let request = ApiAdapterRequest {
            path: adapter.path.to_string_lossy().to_string(),
            weights: &adapter.weights,
            cond_size: adapter.cond_size,
        };

        let response = self.post("/adapters", &request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            Err(AppError::ResourceUnavailable(format!(
                "worker could not load adapter {}: {}",
                adapter.path.display(),
                body
            )))
        } else {
            Err(AppError::SynthesisFailure(format!(
                "adapter load returned {}: {}",
                status, body
            )))
        }
    }

    async fn synthesize(&self, job: SynthesisJob) -> Result<RgbImage> {
        let encode_all = |images: &[RgbImage]| -> Result<Vec<String>> {
            images
                .iter()
                .map(|img| png::encode(img).map(|bytes| base64::encode(&bytes)))
                .collect()
        };

        let request = ApiSynthesizeRequest {
            prompt: &job.prompt,
            height: job.height,
            width: job.width,
            guidance_scale: job.guidance_scale,
            num_inference_steps: job.num_inference_steps,
            max_sequence_length: job.max_sequence_length,
            seed: job.seed,
            spatial_images: encode_all(&job.spatial_images)?,
            subject_images: encode_all(&job.subject_images)?,
            cond_size: job.cond_size,
        };

        let response = self.post("/synthesize", &request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::SynthesisFailure(format!(
                "engine returned {}: {}",
                status, body
            )));
        }

        let api_response: ApiSynthesizeResponse = response
            .json()
            .await
            .map_err(|e| AppError::SynthesisFailure(format!("Failed to parse response: {}", e)))?;

        let encoded = api_response
            .image
            .or_else(|| api_response.images.into_iter().next())
            .ok_or_else(|| AppError::SynthesisFailure("engine returned no images".to_string()))?;

        let bytes = base64::decode(&encoded)
            .map_err(|e| AppError::SynthesisFailure(format!("engine image: {}", e)))?;
        png::decode_rgb(&bytes)
            .map_err(|e| AppError::SynthesisFailure(format!("engine image: {}", e)))
    }

    async fn clear_cache(&self) -> Result<()> {
        let response = self.post("/cache/clear", &serde_json::json!({})).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::Internal(format!(
                "cache clear returned {}",
                response.status()
            )))
        }
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.endpoint);

        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(engine = %self.name, endpoint = %self.endpoint, "Health check passed");
                true
            }
            Ok(response) => {
                warn!(
                    engine = %self.name,
                    endpoint = %self.endpoint,
                    status = %response.status(),
                    "Health check failed"
                );
                false
            }
            Err(e) => {
                warn!(
                    engine = %self.name,
                    endpoint = %self.endpoint,
                    error = %e,
                    "Health check failed"
                );
                false
            }
        }
    }
}
