//! HTTP surface wiring.
//!
//! Builds the shared relay state, mounts the WebSocket, token-issuance,
//! and health routes, and runs the server until interrupted. The relay
//! registries are created here at startup and only ever mutated through
//! the Session Manager.

pub mod auth;
pub mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use lingocast_relay::{
    ConnectionRegistry, LanguageChannelTable, LivenessConfig, LivenessMonitor, MessageRouter,
    SessionManager, TokenVerifier,
};

use crate::config::ServerConfig;
use auth::TokenIssuer;

/// Shared state handed to every route handler.
pub struct AppState {
    pub session: SessionManager,
    pub registry: Arc<ConnectionRegistry>,
    pub channels: Arc<LanguageChannelTable>,
    pub issuer: TokenIssuer,
    pub password: String,
    pub outbound_queue: usize,
}

/// Build the axum router over the shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::websocket_handler))
        .route("/auth", post(auth::issue_token_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the relay until interrupted.
pub async fn start(config: ServerConfig) -> Result<()> {
    let registry = Arc::new(ConnectionRegistry::new());
    let channels = Arc::new(LanguageChannelTable::new(config.languages.iter().cloned()));
    let message_router = Arc::new(MessageRouter::new(
        Arc::clone(&registry),
        Arc::clone(&channels),
    ));
    let session = SessionManager::new(
        Arc::clone(&registry),
        Arc::clone(&channels),
        Arc::clone(&message_router),
        Arc::new(TokenVerifier::new(&config.secret)),
    );

    let shutdown = CancellationToken::new();
    let monitor = LivenessMonitor::new(
        Arc::clone(&registry),
        Arc::clone(&channels),
        message_router,
        LivenessConfig {
            broadcaster_timeout: config.broadcaster_timeout,
            ..LivenessConfig::default()
        },
    );
    let monitor_handle = monitor.spawn(shutdown.clone());

    let state = Arc::new(AppState {
        session,
        registry,
        channels,
        issuer: TokenIssuer::new(&config.secret),
        password: config.password.clone(),
        outbound_queue: config.outbound_queue,
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(bind = %config.bind, languages = ?config.languages, "Relay listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            serve_shutdown.cancel();
        })
        .await
        .context("server error")?;

    shutdown.cancel();
    monitor_handle.await.ok();
    Ok(())
}

/// GET /health
///
/// Liveness probe with the current per-language listener counts.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.registry.connection_count(),
        "listeners": state.channels.counts(),
    }))
}
