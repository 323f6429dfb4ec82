//! In-process engine that echoes the conditioning image back

use async_trait::async_trait;
use image::{imageops::FilterType, RgbImage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::engine::traits::{AdapterSpec, SynthesisEngine, SynthesisJob};
use crate::error::{AppError, Result};

/// Engine that resizes the first spatial image to the requested size.
///
/// It keeps a fake key/value bank that grows on every call, so the reset
/// step is observable from tests.
pub struct EchoEngine {
    name: String,
    ready: AtomicBool,
    delay: Duration,
    failure: Option<String>,
    loaded_adapter: Mutex<Option<AdapterSpec>>,
    kv_bank: Mutex<Vec<u64>>,
    calls: AtomicU64,
}

impl EchoEngine {
    pub fn new() -> Self {
        Self {
            name: "echo".to_string(),
            ready: AtomicBool::new(true),
            delay: Duration::ZERO,
            failure: None,
            loaded_adapter: Mutex::new(None),
            kv_bank: Mutex::new(Vec::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Sleep this long inside every synthesis call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every synthesis call with `message`
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn loaded_adapter(&self) -> Option<AdapterSpec> {
        self.loaded_adapter.lock().clone()
    }

    /// Entries currently held in the key/value bank
    pub fn cached_entries(&self) -> usize {
        self.kv_bank.lock().len()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for EchoEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisEngine for EchoEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load_adapter(&self, adapter: &AdapterSpec) -> Result<()> {
        debug!(path = %adapter.path.display(), "Echo engine loading adapter");
        *self.loaded_adapter.lock() = Some(adapter.clone());
        Ok(())
    }

    async fn synthesize(&self, job: SynthesisJob) -> Result<RgbImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.kv_bank.lock().push(job.seed);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(message) = &self.failure {
            return Err(AppError::SynthesisFailure(message.clone()));
        }

        if self.loaded_adapter.lock().is_none() {
            return Err(AppError::SynthesisFailure(
                "no style adapter loaded".to_string(),
            ));
        }

        let source = job
            .spatial_images
            .first()
            .ok_or_else(|| AppError::SynthesisFailure("no spatial image supplied".to_string()))?;

        Ok(image::imageops::resize(
            source,
            job.width,
            job.height,
            FilterType::Triangle,
        ))
    }

    async fn clear_cache(&self) -> Result<()> {
        self.kv_bank.lock().clear();
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
