//! Functional tests for the generation client

use ghibli_serving::{
    api::routes::create_router,
    client::{self, GenerationClient, GenerationOutcome, Overrides},
    config::Settings,
    engine::echo::EchoEngine,
    response::png,
    AppState,
};
use image::RgbImage;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_input(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("a.png");
    std::fs::write(&path, png::encode(&RgbImage::new(32, 32)).unwrap()).unwrap();
    path
}

fn client_for(base: &str) -> GenerationClient {
    GenerationClient::new(base, Duration::from_secs(5)).unwrap()
}

/// Pull the JSON carried in the `request` part out of a raw multipart body
fn request_part(body: &[u8]) -> Value {
    let text = String::from_utf8_lossy(body);
    let start = text.find("name=\"request\"").expect("request part present");
    let payload_start = start + text[start..].find("\r\n\r\n").unwrap() + 4;
    let payload_end = payload_start + text[payload_start..].find("\r\n--").unwrap();
    serde_json::from_str(&text[payload_start..payload_end]).unwrap()
}

#[tokio::test]
async fn test_success_writes_output_file() {
    let server = MockServer::start().await;
    let generated = png::encode(&RgbImage::new(16, 16)).unwrap();
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(generated.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir);
    let output = dir.path().join("output.png");

    let outcome = client_for(&server.uri())
        .send_generation_request(&input, &output, &Overrides::new())
        .await;

    assert_eq!(
        outcome,
        GenerationOutcome::Saved {
            path: output.clone(),
            bytes: generated.len()
        }
    );
    assert_eq!(std::fs::read(&output).unwrap(), generated);
}

#[tokio::test]
async fn test_request_carries_default_payload_and_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir);

    client_for(&server.uri())
        .send_generation_request(&input, &dir.path().join("out.png"), &Overrides::new())
        .await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    assert_eq!(
        request_part(&requests[0].body),
        json!({
            "prompt": "Ghibli Studio style, Charming hand-drawn anime-style illustration",
            "height": 768,
            "width": 768,
            "seed": 42,
            "control_type": "Ghibli",
            "guidance_scale": 3.5,
            "num_inference_steps": 25,
            "max_sequence_length": 512
        })
    );

    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"spatial_image\"; filename=\"a.png\""));
    assert!(body.contains("Content-Type: image/png"));
}

#[tokio::test]
async fn test_overrides_win() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir);
    let overrides = Overrides::new()
        .set("num_inference_steps", 50)
        .set("guidance_scale", 4.0)
        .set("seed", 123);

    client_for(&server.uri())
        .send_generation_request(&input, &dir.path().join("out.png"), &overrides)
        .await;

    let requests = server.received_requests().await.unwrap();
    let sent = request_part(&requests[0].body);
    assert_eq!(sent["num_inference_steps"], json!(50));
    assert_eq!(sent["guidance_scale"], json!(4.0));
    assert_eq!(sent["seed"], json!(123));
    assert_eq!(sent["height"], json!(768));
}

#[tokio::test]
async fn test_error_status_with_json_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({"status": "error", "error": "engine exploded"})),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir);
    let output = dir.path().join("out.png");

    let outcome = client_for(&server.uri())
        .send_generation_request(&input, &output, &Overrides::new())
        .await;

    assert_eq!(
        outcome,
        GenerationOutcome::Rejected {
            status: 500,
            detail: json!({"status": "error", "error": "engine exploded"})
        }
    );
    assert!(!output.exists());
}

#[tokio::test]
async fn test_error_status_with_non_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir);

    let outcome = client_for(&server.uri())
        .send_generation_request(&input, &dir.path().join("out.png"), &Overrides::new())
        .await;

    assert_eq!(outcome, GenerationOutcome::InvalidJson { status: 502 });
    assert_eq!(outcome.report()[1], "🛑 Invalid JSON response");
}

#[tokio::test]
async fn test_unreachable_service_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir);

    let outcome = client_for(&format!("http://{}", addr))
        .send_generation_request(&input, &dir.path().join("out.png"), &Overrides::new())
        .await;

    assert!(matches!(outcome, GenerationOutcome::Network(_)));
    assert!(outcome.report()[0].starts_with("🛑 Network error: "));
}

#[tokio::test]
async fn test_missing_input_file() {
    let outcome = client_for("http://127.0.0.1:1")
        .send_generation_request(
            Path::new("/nonexistent/input.png"),
            Path::new("out.png"),
            &Overrides::new(),
        )
        .await;

    assert!(matches!(outcome, GenerationOutcome::File(_)));
}

#[tokio::test]
async fn test_round_trip_against_running_service() {
    let adapters = tempfile::tempdir().unwrap();
    std::fs::write(adapters.path().join("Ghibli.safetensors"), b"lora").unwrap();

    let mut settings = Settings::default();
    settings.engine.adapter_dir = adapters.path().to_string_lossy().to_string();
    let state = Arc::new(AppState::new(settings, Arc::new(EchoEngine::new())));
    state.mark_ready();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir);
    let output = dir.path().join("styled.png");

    let outcome = client_for(&format!("http://{}", addr))
        .send_generation_request(
            &input,
            &output,
            &Overrides::new().set("width", 256).set("height", 320),
        )
        .await;
    assert!(outcome.is_success(), "{outcome:?}");

    let written = png::decode_rgb(&std::fs::read(&output).unwrap()).unwrap();
    assert_eq!(written.dimensions(), (256, 320));

    let rejected = client_for(&format!("http://{}", addr))
        .send_generation_request(&input, &output, &Overrides::new().set("height", 2048))
        .await;
    match rejected {
        GenerationOutcome::Rejected { status, detail } => {
            assert_eq!(status, 422);
            assert_eq!(detail["status"], json!("error"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_run_reports_broken_config_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir);
    let config = dir.path().join("broken.toml");
    std::fs::write(&config, "[client\napi_url = ").unwrap();

    let lines = client::run([input.to_string_lossy().to_string()], &config).await;

    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("🛑 Configuration error"), "{lines:?}");
}

#[tokio::test]
async fn test_run_prints_usage_for_missing_image() {
    let dir = tempfile::tempdir().unwrap();

    let lines = client::run(Vec::<String>::new(), &dir.path().join("absent.toml")).await;

    assert!(lines[0].contains("usage: ghibli-client"));
}

#[tokio::test]
async fn test_run_sends_to_configured_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7, 7, 7]))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir);
    let output = dir.path().join("result.png");
    let config = dir.path().join("client.toml");
    std::fs::write(&config, format!("[client]\napi_url = \"{}\"\n", server.uri())).unwrap();

    let lines = client::run(
        [
            input.to_string_lossy().to_string(),
            output.to_string_lossy().to_string(),
            "--seed".to_string(),
            "7".to_string(),
        ],
        &config,
    )
    .await;

    assert_eq!(lines[0], "✅ Generation successful!");
    assert_eq!(std::fs::read(&output).unwrap(), vec![7, 7, 7]);
}
