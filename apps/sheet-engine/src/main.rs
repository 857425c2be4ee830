mod baseline;
mod config;
mod db;
mod dna;
mod drift;
mod engine;
mod errors;
mod gen_client;
mod layout;
mod modify;
mod orchestrator;
mod prompt;
mod routes;
mod sheets;
mod state;
#[cfg(test)]
mod testkit;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::baseline::BaselineStore;
use crate::config::Config;
use crate::db::open_kv_store;
use crate::drift::{LumaSimilarity, RefImageFetcher};
use crate::engine::Engine;
use crate::gen_client::http::{AnthropicReasoningService, HttpImageService, REASONING_MODEL};
use crate::gen_client::GenerationClient;
use crate::layout::LayoutRegistry;
use crate::orchestrator::{ManifestCompositor, Orchestrator};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("sheet_engine={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sheet-engine v{}", env!("CARGO_PKG_VERSION"));

    // Layout invariants are checked once, at startup
    let layouts = Arc::new(LayoutRegistry::load()?);
    info!("Loaded {} sheet layouts", layouts.iter().count());

    let store = BaselineStore::new(open_kv_store(&config.store).await?);

    let client = GenerationClient::new(
        Arc::new(HttpImageService::new(
            config.image_service_url.clone(),
            config.image_service_api_key.clone(),
        )),
        Arc::new(AnthropicReasoningService::new(config.anthropic_api_key.clone())),
        config.engine.retry.clone(),
        config.image_model_id.clone(),
    );
    info!(
        "Generation client initialized (image model: {}, reasoning model: {})",
        config.image_model_id, REASONING_MODEL
    );

    let similarity = Arc::new(LumaSimilarity::new(Arc::new(RefImageFetcher::new())));
    let orchestrator = Orchestrator::new(
        client,
        similarity,
        Arc::new(ManifestCompositor),
        store,
        layouts,
    );

    let state = AppState {
        engine: Arc::new(Engine::new(orchestrator, config.engine.clone())),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
