//! Engine module - Synthesis engine trait, implementations, and adapter lookup

pub mod adapter;
pub mod echo;
pub mod http_engine;
pub mod traits;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{AppError, Result};

pub use traits::{AdapterSpec, SynthesisEngine, SynthesisJob};

/// Build the engine selected by `config.kind`
pub fn from_config(config: &EngineConfig) -> Result<Arc<dyn SynthesisEngine>> {
    match config.kind.as_str() {
        "echo" => Ok(Arc::new(echo::EchoEngine::new())),
        "http" => Ok(Arc::new(http_engine::HttpEngine::new(config)?)),
        other => Err(AppError::Internal(format!("Unknown engine kind '{}'", other))),
    }
}
