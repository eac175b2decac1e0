//! # HTTP Intake Server
//!
//! Synchronous job submission for the print agent.
//!
//! ## Endpoints
//!
//! | Method | Path | Required | Description |
//! |--------|------|----------|-------------|
//! | POST | `/print` | `html` | Print inline HTML |
//! | POST | `/print-url` | `url` | Load a URL and print it |
//! | POST | `/print-pdf` | `pdfUrl` or `pdfBase64` | Print a PDF |
//! | GET | `/printers` | | List printers |
//! | GET | `/health` | | Liveness marker |
//!
//! All bodies are JSON. There is no authentication and CORS is open, so
//! only bind to interfaces the calling application can reach.
//!
//! ## Usage
//!
//! ```bash
//! printbridge serve --listen-ip 0.0.0.0 --port 3000
//! ```

mod handlers;
mod state;

pub use state::{AppState, ServerConfig};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::{PrintError, Result};

/// Build the intake router.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = match state.config.max_payload_mb {
        0 => DefaultBodyLimit::disable(),
        mb => DefaultBodyLimit::max(mb.saturating_mul(1024 * 1024)),
    };

    Router::new()
        .route("/print", post(handlers::print::print_html))
        .route("/print-url", post(handlers::print::print_url))
        .route("/print-pdf", post(handlers::print::print_pdf))
        .route("/printers", get(handlers::printers::list))
        .route("/health", get(handlers::health::health))
        .layer(body_limit)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Bind the intake listener.
///
/// An address that is already in use is a configuration error: the agent
/// cannot run without its port.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener> {
    TcpListener::bind(&config.listen_addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            PrintError::Configuration(format!("Port {} is already in use!", config.port))
        } else {
            PrintError::Configuration(format!("Failed to bind to {}: {}", config.listen_addr, e))
        }
    })
}

/// Serve the intake API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| state.config.listen_addr.clone());

    tracing::info!(%addr, "Print service listening");
    tracing::info!("  POST /print      - Print HTML content");
    tracing::info!("  POST /print-url  - Print from URL");
    tracing::info!("  POST /print-pdf  - Print PDF files");
    tracing::info!("  GET  /printers   - Get available printers");
    tracing::info!("  GET  /health     - Health check");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| PrintError::Transport(format!("Server error: {}", e)))?;

    tracing::info!(%addr, "Print service stopped, port released");
    Ok(())
}
