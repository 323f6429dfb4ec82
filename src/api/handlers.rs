//! HTTP handlers for generation, liveness and readiness

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::api::schemas::GenerationRequest;
use crate::error::{AppError, Result, ValidationErrors};
use crate::queue::executor::QueueStats;
use crate::response::{self, png, ResponseFormat};
use crate::AppState;

pub const REQUEST_FIELD: &str = "request";
pub const IMAGE_FIELD: &str = "spatial_image";

#[derive(Debug, Default, Deserialize)]
pub struct GenerateQuery {
    #[serde(default)]
    pub response_format: Option<String>,
}

/// Parts of the multipart body
struct Upload {
    request: GenerationRequest,
    image: Bytes,
}

/// `POST /generate`
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GenerateQuery>,
    multipart: Multipart,
) -> Result<Response> {
    let request_id = Uuid::new_v4();
    let format = query
        .response_format
        .as_deref()
        .map(ResponseFormat::from_str)
        .unwrap_or_default();

    let result = run_generation(state, multipart, format)
        .instrument(info_span!("generate", request_id = %request_id))
        .await;

    if let Err(e) = &result {
        let (status, code) = e.classify();
        if status.is_server_error() {
            error!(request_id = %request_id, code, error = %e, "Generation failed");
        } else {
            warn!(request_id = %request_id, code, error = %e, "Generation request rejected");
        }
    }

    result
}

async fn run_generation(
    state: Arc<AppState>,
    multipart: Multipart,
    format: ResponseFormat,
) -> Result<Response> {
    let upload = read_upload(multipart).await?;
    let request = upload.request.validate().map_err(AppError::Validation)?;

    info!(
        control_type = %request.control_type,
        width = request.width,
        height = request.height,
        steps = request.num_inference_steps,
        seed = request.seed,
        "Accepted generation request"
    );

    let image_bytes = upload.image;
    let spatial = tokio::task::spawn_blocking(move || png::decode_rgb(&image_bytes))
        .await
        .map_err(|e| AppError::Internal(format!("image decode task failed: {}", e)))??;
    debug!(width = spatial.width(), height = spatial.height(), "Decoded spatial image");

    let generated = state.executor.run(&request, spatial).await?;

    let encoded = tokio::task::spawn_blocking(move || png::encode(&generated))
        .await
        .map_err(|e| AppError::Internal(format!("PNG encode task failed: {}", e)))??;

    Ok(response::render(encoded, format))
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload> {
    let mut request = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(REQUEST_FIELD) => {
                let text = field.text().await.map_err(multipart_error)?;
                let parsed: GenerationRequest = serde_json::from_str(&text).map_err(|e| {
                    AppError::InvalidInput(format!("'{}' field is not valid JSON: {}", REQUEST_FIELD, e))
                })?;
                request = Some(parsed);
            }
            Some(IMAGE_FIELD) => {
                image = Some(field.bytes().await.map_err(multipart_error)?);
            }
            other => {
                debug!(field = ?other, "Ignoring unknown multipart field");
            }
        }
    }

    let mut missing = ValidationErrors::default();
    if request.is_none() {
        missing.push(REQUEST_FIELD, "field required");
    }
    if image.is_none() {
        missing.push(IMAGE_FIELD, "field required");
    }

    match (request, image) {
        (Some(request), Some(image)) => Ok(Upload { request, image }),
        _ => Err(AppError::Validation(missing)),
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    AppError::InvalidInput(format!("malformed multipart body: {}", e))
}

/// Liveness body
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

/// `GET /health`
///
/// Liveness only: answers healthy as soon as the process serves requests,
/// whatever the engine's state. Use `/ready` for engine readiness.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: true,
    })
}

/// Readiness body
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub engine: String,
    pub queue: QueueStats,
}

/// `GET /ready`
pub async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let engine = state.executor.engine();
    let loaded = state.is_initialized() && engine.health_check().await;

    let status = if loaded {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            status: if loaded { "ready" } else { "unavailable" },
            model_loaded: loaded,
            engine: engine.name().to_string(),
            queue: state.executor.stats(),
        }),
    )
}
