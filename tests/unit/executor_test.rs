//! Unit tests for the engine executor

use ghibli_serving::api::schemas::{GenerationRequest, ValidatedRequest};
use ghibli_serving::config::ExecutorConfig;
use ghibli_serving::engine::adapter::AdapterStore;
use ghibli_serving::engine::echo::EchoEngine;
use ghibli_serving::engine::{AdapterSpec, SynthesisEngine, SynthesisJob};
use ghibli_serving::queue::executor::GenerationExecutor;
use ghibli_serving::AppError;
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn adapter_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Ghibli.safetensors"), b"lora").unwrap();
    dir
}

fn request() -> ValidatedRequest {
    GenerationRequest {
        width: 320,
        height: 256,
        ..Default::default()
    }
    .validate()
    .unwrap()
}

fn executor(
    engine: Arc<EchoEngine>,
    dir: &TempDir,
    max_pending: usize,
    queue_timeout_ms: u64,
) -> Arc<GenerationExecutor> {
    Arc::new(GenerationExecutor::new(
        engine,
        AdapterStore::new(dir.path(), 512, 1.0),
        ExecutorConfig {
            max_concurrent: 1,
            max_pending,
            queue_timeout_ms,
        },
    ))
}

/// Engine whose sampler crashes mid-call
struct CrashingEngine;

#[async_trait::async_trait]
impl SynthesisEngine for CrashingEngine {
    fn name(&self) -> &str {
        "crashing"
    }

    async fn load_adapter(&self, _adapter: &AdapterSpec) -> ghibli_serving::Result<()> {
        Ok(())
    }

    async fn synthesize(&self, _job: SynthesisJob) -> ghibli_serving::Result<RgbImage> {
        panic!("sampler crashed");
    }

    async fn clear_cache(&self) -> ghibli_serving::Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[test]
fn test_executor_config_defaults() {
    let config = ExecutorConfig::default();

    assert_eq!(config.max_concurrent, 1);
    assert_eq!(config.max_pending, 8);
    assert_eq!(config.queue_timeout_ms, 120000);
}

#[tokio::test]
async fn test_run_applies_adapter_and_resets_cache() {
    let dir = adapter_dir();
    let engine = Arc::new(EchoEngine::new());
    let exec = executor(engine.clone(), &dir, 4, 1000);

    let image = exec.run(&request(), RgbImage::new(40, 30)).await.unwrap();

    assert_eq!(image.dimensions(), (320, 256));
    assert_eq!(engine.calls(), 1);
    assert_eq!(engine.cached_entries(), 0);

    let adapter = engine.loaded_adapter().unwrap();
    assert_eq!(adapter.path, dir.path().join("Ghibli.safetensors"));
    assert_eq!(adapter.weights, vec![1.0]);
    assert_eq!(adapter.cond_size, 512);

    let stats = exec.stats();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_cache_is_reset_after_failed_synthesis() {
    let dir = adapter_dir();
    let engine = Arc::new(EchoEngine::new().with_failure("sampler diverged"));
    let exec = executor(engine.clone(), &dir, 4, 1000);

    let err = exec.run(&request(), RgbImage::new(8, 8)).await.unwrap_err();

    assert!(matches!(err, AppError::SynthesisFailure(_)));
    assert_eq!(engine.calls(), 1);
    assert_eq!(engine.cached_entries(), 0);
    assert_eq!(exec.stats().failed, 1);
}

#[tokio::test]
async fn test_missing_adapter_never_reaches_engine() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(EchoEngine::new());
    let exec = executor(engine.clone(), &dir, 4, 1000);

    let err = exec.run(&request(), RgbImage::new(8, 8)).await.unwrap_err();

    assert!(matches!(err, AppError::ResourceUnavailable(_)));
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn test_rejects_when_queue_is_full() {
    let dir = adapter_dir();
    let engine = Arc::new(EchoEngine::new().with_delay(Duration::from_millis(300)));
    let exec = executor(engine.clone(), &dir, 1, 5000);

    let first = {
        let exec = exec.clone();
        tokio::spawn(async move { exec.run(&request(), RgbImage::new(8, 8)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = exec.run(&request(), RgbImage::new(8, 8)).await;
    assert!(matches!(second, Err(AppError::QueueFull(1))));

    assert!(first.await.unwrap().is_ok());
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn test_times_out_waiting_for_engine() {
    let dir = adapter_dir();
    let engine = Arc::new(EchoEngine::new().with_delay(Duration::from_millis(400)));
    let exec = executor(engine.clone(), &dir, 4, 50);

    let first = {
        let exec = exec.clone();
        tokio::spawn(async move { exec.run(&request(), RgbImage::new(8, 8)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = exec.run(&request(), RgbImage::new(8, 8)).await;
    assert!(matches!(second, Err(AppError::QueueTimeout(50))));

    assert!(first.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_waiting_requests_run_one_at_a_time() {
    let dir = adapter_dir();
    let engine = Arc::new(EchoEngine::new().with_delay(Duration::from_millis(30)));
    let exec = executor(engine.clone(), &dir, 8, 5000);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let exec = exec.clone();
            let engine = engine.clone();
            tokio::spawn(async move {
                let result = exec.run(&request(), RgbImage::new(8, 8)).await;
                // Cache never holds more than the running request's entry
                assert!(engine.cached_entries() <= 1);
                result
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(engine.calls(), 4);
    assert_eq!(engine.cached_entries(), 0);
    assert_eq!(exec.stats().processed, 4);
}

#[tokio::test]
async fn test_engine_panic_releases_counters_and_permit() {
    let dir = adapter_dir();
    let exec = GenerationExecutor::new(
        Arc::new(CrashingEngine),
        AdapterStore::new(dir.path(), 512, 1.0),
        ExecutorConfig {
            max_concurrent: 1,
            max_pending: 2,
            queue_timeout_ms: 200,
        },
    );

    let err = exec.run(&request(), RgbImage::new(8, 8)).await.unwrap_err();
    assert!(matches!(err, AppError::SynthesisFailure(_)));

    let stats = exec.stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.pending, 0);

    // The permit came back, so the next caller is not stuck behind it
    let err = exec.run(&request(), RgbImage::new(8, 8)).await.unwrap_err();
    assert!(matches!(err, AppError::SynthesisFailure(_)));
}

#[tokio::test]
async fn test_extra_engine_permits_are_reported() {
    let dir = adapter_dir();
    let engine = Arc::new(EchoEngine::new());
    let exec = GenerationExecutor::new(
        engine.clone(),
        AdapterStore::new(dir.path(), 512, 1.0),
        ExecutorConfig {
            max_concurrent: 2,
            max_pending: 4,
            queue_timeout_ms: 1000,
        },
    );

    exec.run(&request(), RgbImage::new(8, 8)).await.unwrap();

    assert_eq!(exec.stats().max_concurrent, 2);
    assert_eq!(engine.cached_entries(), 0);
}
