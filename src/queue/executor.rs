//! Single-flight executor guarding the shared synthesis engine

use image::RgbImage;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument};

use crate::api::schemas::ValidatedRequest;
use crate::config::ExecutorConfig;
use crate::engine::adapter::AdapterStore;
use crate::engine::traits::{SynthesisEngine, SynthesisJob};
use crate::error::{AppError, Result};

/// Runs adapt, synthesize and reset against the engine with bounded admission.
///
/// The engine permit is held for the whole sequence, so with the default of
/// one permit no two requests ever touch the engine's cache at the same time.
pub struct GenerationExecutor {
    engine: Arc<dyn SynthesisEngine>,
    adapters: AdapterStore,
    semaphore: Arc<Semaphore>,
    config: ExecutorConfig,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    pending: AtomicUsize,
    in_flight: AtomicUsize,
    processed: AtomicU64,
    failed: AtomicU64,
}

/// Decrements the pending counter however the caller leaves
struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decrements the in-flight counter even if the engine panics
struct InFlightGuard(Arc<Counters>);

impl InFlightGuard {
    fn enter(counters: Arc<Counters>) -> Self {
        counters.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Executor statistics
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub processed: u64,
    pub failed: u64,
    pub max_pending: usize,
    pub max_concurrent: usize,
}

impl GenerationExecutor {
    pub fn new(
        engine: Arc<dyn SynthesisEngine>,
        adapters: AdapterStore,
        config: ExecutorConfig,
    ) -> Self {
        if config.max_concurrent > 1 {
            warn!(
                max_concurrent = config.max_concurrent,
                "Engine shared by several requests at once; cache resets may interleave"
            );
        }

        Self {
            engine,
            adapters,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn engine(&self) -> &Arc<dyn SynthesisEngine> {
        &self.engine
    }

    /// Generate one image for an already validated request.
    ///
    /// Once the engine permit is obtained the work runs on its own task:
    /// a caller that goes away does not cancel synthesis or skip the reset.
    pub async fn run(&self, request: &ValidatedRequest, spatial: RgbImage) -> Result<RgbImage> {
        let admitted = self.counters.pending.fetch_add(1, Ordering::SeqCst);
        let _pending = PendingGuard(&self.counters.pending);
        if admitted >= self.config.max_pending {
            warn!(pending = admitted, "Generation queue full, rejecting request");
            return Err(AppError::QueueFull(self.config.max_pending));
        }

        let wait_started = Instant::now();
        let timeout = Duration::from_millis(self.config.queue_timeout_ms);
        let permit = match tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(AppError::Internal("engine executor is shut down".to_string()));
            }
            Err(_) => {
                warn!(timeout_ms = self.config.queue_timeout_ms, "Timed out waiting for engine");
                return Err(AppError::QueueTimeout(self.config.queue_timeout_ms));
            }
        };
        debug!(waited_ms = wait_started.elapsed().as_millis() as u64, "Acquired engine permit");

        let adapter = self.adapters.resolve(request.control_type)?;
        let engine = self.engine.clone();
        let counters = self.counters.clone();
        let job = SynthesisJob {
            prompt: request.prompt.clone(),
            height: request.height,
            width: request.width,
            guidance_scale: request.guidance_scale,
            num_inference_steps: request.num_inference_steps,
            max_sequence_length: request.max_sequence_length,
            seed: request.seed,
            spatial_images: vec![spatial],
            subject_images: Vec::new(),
            cond_size: self.adapters.cond_size(),
        };

        let task = tokio::spawn(
            async move {
                let _permit = permit;
                let in_flight = InFlightGuard::enter(counters.clone());
                let started = Instant::now();

                let result = match engine.load_adapter(&adapter).await {
                    Ok(()) => {
                        let result = engine.synthesize(job).await;
                        if let Err(e) = engine.clear_cache().await {
                            warn!(engine = %engine.name(), error = %e, "Failed to clear engine cache");
                        }
                        result
                    }
                    Err(e) => Err(e),
                };

                drop(in_flight);
                match &result {
                    Ok(_) => {
                        counters.processed.fetch_add(1, Ordering::SeqCst);
                        info!(
                            engine = %engine.name(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Synthesis completed"
                        );
                    }
                    Err(_) => {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                    }
                }
                result
            }
            .in_current_span(),
        );

        task.await
            .map_err(|e| AppError::SynthesisFailure(format!("synthesis task aborted: {}", e)))?
    }

    /// Get executor statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.counters.pending.load(Ordering::SeqCst),
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            processed: self.counters.processed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            max_pending: self.config.max_pending,
            max_concurrent: self.config.max_concurrent,
        }
    }
}
