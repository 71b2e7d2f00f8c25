pub mod proposals;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::error;

use proposal_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
}

impl AppStateInner {
    pub fn new(db: Database) -> AppState {
        Arc::new(Self { db })
    }
}

/// All proposal routes. Transport layers (CORS, tracing) are added by the
/// binary that serves it.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/proposals", post(proposals::create_proposal))
        .route("/api/proposals/{proposal_id}", get(proposals::get_proposal))
        .route("/api/proposals/{proposal_id}/respond", post(proposals::respond_to_proposal))
        .route("/api/proposals/{proposal_id}/status", get(proposals::get_proposal_status))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Proposal API is running!" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Run a store call off the async runtime, mapping any failure to a 500.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Database error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
