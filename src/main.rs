//! Face Embedding Service
//!
//! Extracts face embeddings, averages enrollment photos and optionally
//! matches against a pgvector or SQLite store, over a REST (Axum) API.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use faceprint::config::Config;
use faceprint::engine::{FaceEmbedder, FaceNetModel, ModelPool};
use faceprint::service::FaceService;
use faceprint::storage;
use faceprint::api::rest::{AppState, create_rest_router};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Starting Face Embedding Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = Config::load(&Config::default_path()).unwrap_or_else(|e| {
        info!("Using default config ({})", e);
        Config::default()
    });
    config.apply_env();

    info!("Configuration loaded:");
    info!("  Port: {}", config.server.port);
    info!("  Device: {}", config.inference.device);
    info!("  Model idle timeout: {}s", config.inference.model_idle_timeout);
    info!("  Embedding dim: {}", config.recognition.embedding_dim);
    info!("  Storage: {:?}", config.storage.storage_type);

    // Initialize model pool
    let pool = Arc::new(ModelPool::new(&config.inference, &config.models)?);

    // Start model cleanup task
    tokio::spawn(pool.clone().start_cleanup_task());

    let model = Arc::new(FaceNetModel::new(pool.clone(), &config.recognition));
    let embedder = Arc::new(FaceEmbedder::new(model, config.recognition.embedding_dim));

    // Initialize storage; an unreachable database is fatal
    let store = storage::open(&config).await?;

    let service = Arc::new(FaceService::new(
        embedder,
        store,
        config.recognition.match_threshold,
    ));

    let app_state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });

    let router = create_rest_router(app_state, config.server.body_limit);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("REST API listening on http://{}", addr);
    info!("Face Embedding Service is ready!");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, cleaning up...");
        })
        .await?;

    // Shutdown model pool
    pool.shutdown();

    info!("Goodbye!");
    Ok(())
}
