//! specdrafter-server - SpecDrafter chat backend
//!
//! Guides a user through phased requirements gathering over HTTP, persisting
//! conversations in SQLite and delegating generation to Gemini.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use specdrafter_common::config::load_optional_config;
use specdrafter_server::config::{Args, ServerConfig};
use specdrafter_server::provider::{GeminiConfig, GeminiProvider};
use specdrafter_server::services::SymphoniaTranscoder;
use specdrafter_server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config =
        load_optional_config(args.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins; otherwise the configured level applies to this crate
    let default_filter = format!(
        "specdrafter_server={level},specdrafter_common={level},tower_http=info",
        level = toml_config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting specdrafter-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = ServerConfig::resolve(args, toml_config)?;
    info!("Model: {} / TTS: {}", config.generation.model, config.generation.tts_model);

    let db_pool = specdrafter_server::db::init_database_pool(&config.database_url).await?;
    info!("Database connection established");

    let provider = GeminiProvider::new(GeminiConfig {
        api_key: config.api_key.clone(),
        base_url: config.base_url.clone(),
    })
    .context("Failed to create Gemini client")?;

    let state = AppState::new(
        db_pool.clone(),
        Arc::new(provider),
        Arc::new(SymphoniaTranscoder),
        config.generation.clone(),
    );

    let app = specdrafter_server::build_router(state)
        .layer(specdrafter_server::cors_layer(&config.cors_origins)?);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    db_pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
