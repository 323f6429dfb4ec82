//! Style-adapter image generation service
//!
//! An HTTP service that applies a LoRA style adapter to a shared image
//! synthesis engine and turns an uploaded reference image into a stylized
//! PNG, plus the client and health prober that talk to it.

pub mod api;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod probe;
pub mod queue;
pub mod response;
pub mod telemetry;

pub use error::{AppError, Result};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use engine::{adapter::AdapterStore, SynthesisEngine};
use queue::executor::GenerationExecutor;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub executor: Arc<GenerationExecutor>,
    ready: AtomicBool,
}

impl AppState {
    pub fn new(settings: config::Settings, engine: Arc<dyn SynthesisEngine>) -> Self {
        let adapters = AdapterStore::from_config(&settings.engine);
        let executor = GenerationExecutor::new(engine, adapters, settings.executor.clone());

        Self {
            settings: Arc::new(settings),
            executor: Arc::new(executor),
            ready: AtomicBool::new(false),
        }
    }

    /// Flag the engine as initialized; `/ready` reports unavailable until then
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
