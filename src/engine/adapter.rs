//! Style adapter lookup

use std::path::PathBuf;
use tracing::debug;

use crate::api::schemas::ControlType;
use crate::config::EngineConfig;
use crate::engine::traits::AdapterSpec;
use crate::error::{AppError, Result};

const ADAPTER_EXTENSION: &str = "safetensors";

/// Resolves control types to adapter weight files in a fixed directory
#[derive(Debug, Clone)]
pub struct AdapterStore {
    dir: PathBuf,
    cond_size: u32,
    weight: f32,
}

impl AdapterStore {
    pub fn new(dir: impl Into<PathBuf>, cond_size: u32, weight: f32) -> Self {
        Self {
            dir: dir.into(),
            cond_size,
            weight,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.adapter_dir, config.cond_size, config.lora_weight)
    }

    pub fn cond_size(&self) -> u32 {
        self.cond_size
    }

    /// Path the adapter for `control` is expected at
    pub fn path_for(&self, control: ControlType) -> PathBuf {
        self.dir
            .join(format!("{}.{}", control.as_str(), ADAPTER_EXTENSION))
    }

    /// Resolve the adapter for `control`, failing if the weights file is absent
    pub fn resolve(&self, control: ControlType) -> Result<AdapterSpec> {
        let path = self.path_for(control);
        if !path.is_file() {
            return Err(AppError::ResourceUnavailable(format!(
                "adapter weights not found at {}",
                path.display()
            )));
        }

        debug!(control_type = %control, path = %path.display(), "Resolved style adapter");

        Ok(AdapterSpec {
            path,
            weights: vec![self.weight],
            cond_size: self.cond_size,
        })
    }
}
