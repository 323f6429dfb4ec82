//! Request schema for `/generate` and its validation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationErrors;

pub const DEFAULT_PROMPT: &str = "Ghibli Studio style, Charming hand-drawn anime-style illustration";
pub const MIN_DIMENSION: u32 = 256;
pub const MAX_DIMENSION: u32 = 1024;
pub const MIN_SEQUENCE_LENGTH: u32 = 64;

/// Style adapters the service knows how to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlType {
    Ghibli,
}

impl ControlType {
    pub const ALL: [ControlType; 1] = [ControlType::Ghibli];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlType::Ghibli => "Ghibli",
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unsupported control type '{}' (supported: {})",
                    s,
                    Self::ALL.map(|c| c.as_str()).join(", ")
                )
            })
    }
}

/// Generation parameters as sent in the `request` multipart field.
///
/// Every field is optional on the wire and falls back to the client defaults.
/// Integers are signed so out-of-range values reach [`GenerationRequest::validate`]
/// instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub height: i64,
    pub width: i64,
    pub seed: i64,
    pub control_type: String,
    pub guidance_scale: f64,
    pub num_inference_steps: i64,
    pub max_sequence_length: i64,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            height: 768,
            width: 768,
            seed: 42,
            control_type: ControlType::Ghibli.as_str().to_string(),
            guidance_scale: 3.5,
            num_inference_steps: 25,
            max_sequence_length: 512,
        }
    }
}

/// Parameters that passed validation; the only input the pipeline accepts
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub prompt: String,
    pub height: u32,
    pub width: u32,
    pub seed: u64,
    pub control_type: ControlType,
    pub guidance_scale: f32,
    pub num_inference_steps: u32,
    pub max_sequence_length: u32,
}

impl GenerationRequest {
    /// Check every field and collect all violations
    pub fn validate(&self) -> std::result::Result<ValidatedRequest, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let control_type = match self.control_type.parse::<ControlType>() {
            Ok(c) => Some(c),
            Err(msg) => {
                errors.push("control_type", msg);
                None
            }
        };

        let height = dimension(self.height, "height", &mut errors);
        let width = dimension(self.width, "width", &mut errors);

        // The engine takes f32; judge the value it will actually receive
        let guidance_scale = self.guidance_scale as f32;
        if !(guidance_scale.is_finite() && guidance_scale > 0.0) {
            errors.push("guidance_scale", "must be greater than 0");
        }

        let steps = u32::try_from(self.num_inference_steps)
            .ok()
            .filter(|s| *s >= 1);
        if steps.is_none() {
            errors.push("num_inference_steps", "must be at least 1");
        }

        let max_seq = u32::try_from(self.max_sequence_length)
            .ok()
            .filter(|s| *s >= MIN_SEQUENCE_LENGTH);
        if max_seq.is_none() {
            errors.push(
                "max_sequence_length",
                format!("must be >= {}", MIN_SEQUENCE_LENGTH),
            );
        }

        match (control_type, height, width, steps, max_seq) {
            (Some(control_type), Some(height), Some(width), Some(steps), Some(max_seq))
                if errors.is_empty() =>
            {
                Ok(ValidatedRequest {
                    prompt: self.prompt.clone(),
                    height,
                    width,
                    // Negative seeds keep their bit pattern
                    seed: self.seed as u64,
                    control_type,
                    guidance_scale,
                    num_inference_steps: steps,
                    max_sequence_length: max_seq,
                })
            }
            _ => Err(errors),
        }
    }
}

fn dimension(value: i64, field: &str, errors: &mut ValidationErrors) -> Option<u32> {
    match u32::try_from(value) {
        Ok(v) if (MIN_DIMENSION..=MAX_DIMENSION).contains(&v) => Some(v),
        _ => {
            errors.push(
                field,
                format!("must be between {} and {}", MIN_DIMENSION, MAX_DIMENSION),
            );
            None
        }
    }
}
