//! Image decoding and PNG encoding

use image::{ImageFormat, RgbImage};
use std::io::Cursor;

use crate::error::{AppError, Result};

/// Decode any supported image format to an RGB bitmap
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(AppError::InvalidImage("empty image upload".to_string()));
    }

    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| AppError::InvalidImage(e.to_string()))
}

/// Encode an RGB bitmap as PNG
pub fn encode(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| AppError::Internal(format!("Failed to encode PNG: {}", e)))?;
    Ok(buf)
}

/// Check the PNG signature
pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A])
}
