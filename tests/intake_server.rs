//! Intake API behavior tests against a dry-run engine.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use printbridge::JobExecutor;
use printbridge::engine::{MemoryEngine, PrinterInfo};
use printbridge::executor::ExecutorConfig;
use printbridge::job::ContentKind;
use printbridge::server::{AppState, ServerConfig, router};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app(engine: &MemoryEngine) -> axum::Router {
    app_with(engine, ExecutorConfig::default(), 50)
}

fn app_with(engine: &MemoryEngine, executor: ExecutorConfig, max_payload_mb: usize) -> axum::Router {
    let executor = Arc::new(JobExecutor::new(Arc::new(engine.clone()), executor));
    let config = ServerConfig {
        listen_addr: "127.0.0.1:3000".to_string(),
        port: 3000,
        max_payload_mb,
    };
    router(Arc::new(AppState::new(config, executor)))
}

async fn post(app: axum::Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    send(app, request).await
}

async fn get(app: axum::Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("request");
    send(app, request).await
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_reports_port() {
    let engine = MemoryEngine::new();

    let (status, body) = get(app(&engine), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"success": true, "message": "Print service is running", "port": 3000})
    );
}

#[tokio::test]
async fn print_html_without_printer_uses_os_default() {
    let engine = MemoryEngine::new();

    let (status, body) = post(app(&engine), "/print", json!({"html": "<p>hi</p>"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "message": "Print job sent successfully"}));

    let calls = engine.print_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, ContentKind::Html);
    assert_eq!(calls[0].options["deviceName"], json!(""));
    assert_eq!(calls[0].options["silent"], json!(true));
    assert_eq!(calls[0].options["printBackground"], json!(true));
    assert!(calls[0].url.starts_with("data:text/html;charset=utf-8,"));
    assert_eq!(engine.surfaces_closed(), 1);
}

#[tokio::test]
async fn print_uses_configured_default_printer() {
    let engine = MemoryEngine::new();
    let executor = ExecutorConfig {
        default_printer: Some("Front Desk".into()),
        ..Default::default()
    };

    let (status, _) = post(
        app_with(&engine, executor, 50),
        "/print-url",
        json!({"url": "https://example.com/invoice", "options": {"landscape": true}}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let call = &engine.print_calls()[0];
    assert_eq!(call.url, "https://example.com/invoice");
    assert_eq!(call.options["deviceName"], json!("Front Desk"));
    assert_eq!(call.options["landscape"], json!(true));
}

#[tokio::test]
async fn print_pdf_without_source_is_bad_request() {
    let engine = MemoryEngine::new();

    let (status, body) = post(app(&engine), "/print-pdf", json!({"printerName": "P1"})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"success": false, "message": "PDF URL or Base64 data is required"})
    );
    assert_eq!(engine.surfaces_opened(), 0);
}

#[tokio::test]
async fn missing_fields_are_bad_requests() {
    for (path, message) in [
        ("/print", "HTML content is required"),
        ("/print-url", "URL is required"),
    ] {
        let engine = MemoryEngine::new();

        let (status, body) = post(app(&engine), path, json!({"html": ""})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
        assert_eq!(body["message"], json!(message));
    }
}

#[tokio::test]
async fn mistyped_optional_field_does_not_hide_content() {
    let engine = MemoryEngine::new();

    let (status, body) = post(
        app(&engine),
        "/print",
        json!({"html": "<p>hi</p>", "printerName": 5}),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(engine.print_calls()[0].options["deviceName"], json!(""));
}

#[tokio::test]
async fn switch_like_url_is_bad_request() {
    let engine = MemoryEngine::new();

    let (status, body) = post(
        app(&engine),
        "/print-url",
        json!({"url": "--gpu-launcher=touch /tmp/printbridge-owned"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(engine.surfaces_opened(), 0);
}

#[tokio::test]
async fn print_pdf_base64_prints_without_background() {
    let engine = MemoryEngine::new();

    let (status, body) = post(
        app(&engine),
        "/print-pdf",
        json!({"pdfBase64": "JVBERi0xLjQK", "printerName": "Office"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("PDF printed successfully"));
    let call = &engine.print_calls()[0];
    assert_eq!(call.url, "data:application/pdf;base64,JVBERi0xLjQK");
    assert_eq!(call.options["deviceName"], json!("Office"));
    assert_eq!(call.options["printBackground"], json!(false));
}

#[tokio::test]
async fn rejected_print_is_server_error() {
    let engine = MemoryEngine::new().rejecting_print("printer offline");

    let (status, body) = post(app(&engine), "/print", json!({"html": "<p/>"})).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["message"], json!("Print failed: printer offline"));
    assert_eq!(engine.surfaces_closed(), 1);
}

#[tokio::test]
async fn printers_lists_engine_printers() {
    let engine = MemoryEngine::new().with_printers(vec![
        PrinterInfo::new("Office").default_printer(),
        PrinterInfo::new("Label"),
    ]);

    let (status, body) = get(app(&engine), "/printers").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    let names: Vec<&str> = body["printers"]
        .as_array()
        .expect("printers array")
        .iter()
        .map(|p| p["name"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(names, vec!["Office", "Label"]);
    assert_eq!(body["printers"][0]["isDefault"], json!(true));
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let engine = MemoryEngine::new();
    let html = "x".repeat(2 * 1024 * 1024);

    let (status, _) = post(
        app_with(&engine, ExecutorConfig::default(), 1),
        "/print",
        json!({"html": html}),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(engine.surfaces_opened(), 0);
}

#[tokio::test]
async fn cors_is_open() {
    let engine = MemoryEngine::new();
    let request = Request::builder()
        .uri("/health")
        .header("origin", "https://app.example.com")
        .body(Body::empty())
        .expect("request");

    let response = app(&engine).oneshot(request).await.expect("response");

    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
}
