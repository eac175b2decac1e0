//! Liveness handler.

use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;

use super::super::state::AppState;

/// GET /health - always succeeds while the process is serving.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Print service is running",
        "port": state.config.port,
    }))
}
