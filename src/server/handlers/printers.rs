//! Printer list handler.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;

use super::super::state::AppState;

/// GET /printers - printers visible to the OS.
pub async fn list(State(state): State<Arc<AppState>>) -> Response {
    match state.executor.printers().await {
        Ok(printers) => Json(json!({
            "success": true,
            "printers": printers,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list printers");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
