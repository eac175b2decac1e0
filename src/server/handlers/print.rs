//! Print job handlers.
//!
//! Each endpoint accepts a JSON body, validates the one content field it
//! needs and runs the job to completion before answering:
//!
//! | Status | Body |
//! |--------|------|
//! | 200 | `{"success": true, "message": ...}` |
//! | 400 | `{"success": false, "message": "<content> is required"}` |
//! | 500 | `{"success": false, "message": ...}` |

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;

use crate::job::{ContentKind, JobPayload, PrintResult};

use super::super::state::AppState;

/// POST /print - print inline HTML.
pub async fn print_html(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    run(&state, ContentKind::Html, &body).await
}

/// POST /print-url - load a URL and print it.
pub async fn print_url(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    run(&state, ContentKind::Url, &body).await
}

/// POST /print-pdf - print a PDF from `pdfUrl` or `pdfBase64`.
pub async fn print_pdf(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    run(&state, ContentKind::Pdf, &body).await
}

/// Decode the request body; anything that is not JSON counts as `{}`.
pub(crate) fn parse_payload(body: &[u8]) -> JobPayload {
    serde_json::from_slice::<Value>(body)
        .map(JobPayload::from_value)
        .unwrap_or_default()
}

async fn run(state: &AppState, kind: ContentKind, body: &[u8]) -> Response {
    let job = match parse_payload(body).into_job(kind) {
        Ok(job) => job,
        Err(e) => {
            tracing::warn!(?kind, error = %e, "Rejected print request");
            return (StatusCode::BAD_REQUEST, Json(PrintResult::from(e))).into_response();
        }
    };

    tracing::info!(?kind, printer = job.printer_name.as_deref().unwrap_or(""), "Print request");
    let result = state.executor.execute(&job).await;

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result)).into_response()
}
