mod config;
mod errors;
mod history;
mod key_store;
mod llm_client;
mod models;
mod orchestrator;
mod personas;
mod routes;
mod state;
mod storage;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::history::HistoryStore;
use crate::key_store::LocalKeyStore;
use crate::llm_client::HttpGateway;
use crate::orchestrator::RunRegistry;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting HiReview API v{}", env!("CARGO_PKG_VERSION"));

    // Local stores
    let key_store = LocalKeyStore::open(config.keys_path())
        .await
        .context("Failed to open key store")?;
    let history = HistoryStore::new(config.history_path(), config.history_capacity);
    info!(data_dir = %config.data_dir.display(), "Local stores ready");

    // Provider gateway
    let gateway = HttpGateway::new(config.endpoints.clone())?;
    info!(
        timeout_secs = config.stream_timeout.as_secs(),
        "Provider gateway initialized"
    );

    // Build app state
    let state = AppState {
        config: config.clone(),
        gateway: Arc::new(gateway),
        key_store: Arc::new(key_store),
        history: Arc::new(history),
        runs: Arc::new(RunRegistry::default()),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
