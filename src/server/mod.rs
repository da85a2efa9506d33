pub mod api;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Json, Router,
};
use colored::*;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::anchor::AnchorStore;
use crate::config::ServerConfig;
use crate::sync::{ConnectionRegistry, SyncProtocol};

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AnchorStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub protocol: SyncProtocol,
    pub status_refresh: Duration,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        let store = Arc::new(AnchorStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let protocol = SyncProtocol::new(Arc::clone(&store), Arc::clone(&registry));
        Self {
            store,
            registry,
            protocol,
            status_refresh: config.status_refresh,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws::root))
        .route("/ws", get(ws::upgrade))
        .route("/health", get(|| async { Json("OK") }))
        .route("/getAllAnchors", get(api::get_all_anchors))
        .route("/clearAllAnchors", get(api::clear_all_anchors))
        .route("/setAnchor", post(api::set_anchor))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Bind the configured address and serve until the process exits.
pub async fn start(config: ServerConfig) -> Result<()> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    println!(
        "{} Server is running on {}",
        "✓".green(),
        format!("http://localhost:{}", config.port).bright_blue()
    );

    serve(listener, AppState::new(&config)).await
}

/// Serve on an already-bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "anchor sync server listening");
    axum::serve(listener, router(state))
        .await
        .context("server terminated")?;
    Ok(())
}
