//! Base64 encoding and decoding utilities

use base64::{engine::general_purpose::STANDARD, Engine};
use crate::error::{AppError, Result};

/// Encode binary data to base64 string
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode base64 string to binary data
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    // Handle data URL format (e.g., "data:image/png;base64,...")
    let data = match encoded.split_once(',') {
        Some((_, payload)) => payload,
        None => encoded,
    };

    STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::InvalidInput(format!("Invalid base64 data: {}", e)))
}
