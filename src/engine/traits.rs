//! Common traits and types for image synthesis engines

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Style adapter to apply before a synthesis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterSpec {
    /// Resolved path of the LoRA weights file
    pub path: PathBuf,

    /// Per-adapter blend weights
    pub weights: Vec<f32>,

    /// Resolution the conditioning image is encoded at
    pub cond_size: u32,
}

/// Everything the engine needs for one generation
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub prompt: String,
    pub height: u32,
    pub width: u32,
    pub guidance_scale: f32,
    pub num_inference_steps: u32,
    pub max_sequence_length: u32,

    /// Seed for the engine's deterministic generator
    pub seed: u64,

    /// Spatial conditioning images (this service always sends exactly one)
    pub spatial_images: Vec<RgbImage>,

    /// Subject conditioning images (always empty in this flow)
    pub subject_images: Vec<RgbImage>,

    pub cond_size: u32,
}

/// Trait for image synthesis engines.
///
/// Implementations are long-lived and shared between requests. Callers must
/// serialize `load_adapter` / `synthesize` / `clear_cache` sequences through
/// [`crate::queue::executor::GenerationExecutor`].
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Engine name used in logs and readiness output
    fn name(&self) -> &str;

    /// Apply a style adapter to the engine's transformer
    async fn load_adapter(&self, adapter: &AdapterSpec) -> Result<()>;

    /// Run the sampling loop and return the first generated image
    async fn synthesize(&self, job: SynthesisJob) -> Result<RgbImage>;

    /// Drop any attention key/value state accumulated by the last call
    async fn clear_cache(&self) -> Result<()>;

    /// Check if the engine is loaded and answering
    async fn health_check(&self) -> bool;
}
