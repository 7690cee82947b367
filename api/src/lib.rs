//! HTTP surface of the search pipeline.
//!
//! - `POST /search`  `{query, limit?, filters?}` → ranked items + diagnostics
//! - `POST /extract` `{query}` → Filter Schema
//! - `GET  /health`  → LLM providers and Qdrant

mod core;
mod error_handler;
mod middleware_layer;
mod routes;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use crate::core::app_state::{AppState, SearchBackend};
pub use crate::error_handler::{AppError, AppResult};

use crate::{
    middleware_layer::request_id::ensure_request_id,
    routes::{extract::extract_route::extract_route, health_route::health_route, search::search_route::search_route},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/search", post(search_route))
        .route("/extract", post(extract_route))
        .route("/health", get(health_route))
        .layer(middleware::from_fn(ensure_request_id))
        .with_state(state)
}

/// Serves until Ctrl+C or `shutdown` fires.
pub async fn start(backend: Arc<dyn SearchBackend>, address: &str, shutdown: CancellationToken) -> AppResult<()> {
    let app = router(AppState::new(backend));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|source| AppError::Bind {
            address: address.to_string(),
            source,
        })?;
    info!(target: "api::server", %address, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(AppError::Server)?;

    info!(target: "api::server", "stopped");
    Ok(())
}

/// Resolves on Ctrl+C or when `shutdown` is cancelled.
async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            if let Err(e) = r {
                tracing::warn!(target: "api::server", error = %e, "ctrl-c handler unavailable; waiting for shutdown token");
                shutdown.cancelled().await;
            }
        }
        _ = shutdown.cancelled() => {}
    }
}
