//! Liveness endpoint: `GET /` answers `200 ready`.

use crate::dispatch::CredentialPool;
use crate::error::{RelayError, Result};
use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Build the liveness router
pub fn router(pool: Arc<CredentialPool>) -> Router {
    Router::new().route("/", get(ready)).with_state(pool)
}

async fn ready(State(pool): State<Arc<CredentialPool>>) -> (StatusCode, &'static str) {
    info!(usable_credentials = pool.size(), "health check");
    (StatusCode::OK, "ready")
}

/// Serve the liveness endpoint until the listener fails
pub async fn serve(listener: TcpListener, pool: Arc<CredentialPool>) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, usable_credentials = pool.size(), "health endpoint listening");

    axum::serve(listener, router(pool))
        .await
        .map_err(|e| RelayError::Internal(format!("health endpoint stopped: {}", e)))
}

/// Bind `addr` and serve
pub async fn bind_and_serve(addr: &str, pool: Arc<CredentialPool>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RelayError::Config(format!("Failed to bind health endpoint {}: {}", addr, e)))?;
    serve(listener, pool).await
}
