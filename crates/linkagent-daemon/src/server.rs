//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api;
use crate::state::AppState;
use crate::ws;

/// API and WebSocket routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/state", get(api::get_state))
        .route("/api/links", get(api::list_links))
        .route("/api/hosts", get(api::list_hosts))
        .route("/api/ports", get(api::list_ports))
        .route("/api/config", get(api::get_config))
        .route("/api/config", post(api::update_config))
        .route("/api/tree", get(api::get_tree))
        // Export-tree notifications
        .route("/ws", get(ws::websocket_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start discovery and serve the API until Ctrl-C
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let app = router(state.clone());

    state.controller.start();

    let bind = state.config.daemon.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Unable to listen for Ctrl-C; shutting down");
    }
    info!("Shutdown requested");
    state.controller.stop();
    state.controller.join().await;
}
