pub mod commands;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;
pub mod utils;

use anyhow::{Context, Result};
use std::sync::Arc;

use models::settings::AppSettings;
use services::pipeline::Pipeline;

/// Shared by every request handler. Nothing in here is mutated after startup;
/// each request builds its own snapshot.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<AppSettings>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(settings: AppSettings) -> Self {
        let settings = Arc::new(settings);
        let pipeline = Arc::new(Pipeline::from_settings(Arc::clone(&settings)));
        Self { settings, pipeline }
    }

    /// State around a prebuilt pipeline (tests inject fake sources this way).
    pub fn with_pipeline(settings: AppSettings, pipeline: Pipeline) -> Self {
        Self {
            settings: Arc::new(settings),
            pipeline: Arc::new(pipeline),
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            log::error!("Could not install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Bind and serve until Ctrl+C.
pub async fn run(settings: AppSettings) -> Result<()> {
    let addr = settings.bind_addr();
    log::info!(
        "Starting market brief service on {} ({:?} sections, insights {})",
        addr,
        settings.execution,
        if settings.ai.api_key.is_some() { "enabled" } else { "disabled" }
    );

    let app = commands::create_router(AppState::new(settings));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    log::info!("Server stopped");
    Ok(())
}
