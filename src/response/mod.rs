//! Response handling module - PNG streaming and base64 JSON bodies

pub mod base64;
pub mod png;

use axum::{
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Response format options for `/generate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Raw `image/png` body
    #[default]
    Png,
    /// `GenerationResponse` JSON with the PNG base64 encoded
    Base64Json,
}

impl ResponseFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "b64_json" | "base64" | "json" => Self::Base64Json,
            _ => Self::Png, // Default to PNG
        }
    }
}

/// JSON body used when the caller asks for base64 output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationResponse {
    pub fn success(png_bytes: &[u8]) -> Self {
        Self {
            status: "success".to_string(),
            image_base64: Some(base64::encode(png_bytes)),
            error: None,
        }
    }
}

/// Turn encoded PNG bytes into the HTTP response for `format`
pub fn render(png_bytes: Vec<u8>, format: ResponseFormat) -> Response {
    match format {
        ResponseFormat::Png => {
            ([(header::CONTENT_TYPE, "image/png")], png_bytes).into_response()
        }
        ResponseFormat::Base64Json => Json(GenerationResponse::success(&png_bytes)).into_response(),
    }
}
