//! Main entry point for the generation service

use ghibli_serving::{api, config::Settings, engine, telemetry, AppState};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    telemetry::init(&settings.logging);
    info!("Starting style generation service");
    info!(
        "Loaded configuration: server={}:{} engine={}",
        settings.server.host, settings.server.port, settings.engine.kind
    );

    if !Path::new(&settings.engine.adapter_dir).is_dir() {
        warn!(
            adapter_dir = %settings.engine.adapter_dir,
            "Adapter directory does not exist; generation will report the adapter as unavailable"
        );
    }

    // Initialize the shared engine
    let engine = engine::from_config(&settings.engine)?;
    if !engine.health_check().await {
        warn!(engine = %engine.name(), "Engine is not answering yet; /ready reports unavailable until it does");
    }

    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let app_state = Arc::new(AppState::new(settings, engine));
    app_state.mark_ready();

    // Build the router
    let app = api::routes::create_router(app_state.clone());

    info!("Server listening on {}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
