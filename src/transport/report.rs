//! Outcome reporting for pushed jobs.
//!
//! Push callers get no HTTP response, so each outcome is logged and, when a
//! callback URL is configured, POSTed back:
//!
//! ```json
//! {"jobId":"print_1","success":true,"message":"Print job sent successfully","timestamp":"2025-01-01T00:00:00+00:00"}
//! ```
//!
//! The POST is fire-and-forget; a failed callback is only logged.

use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};

use crate::job::PrintResult;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Reporter {
    callback_url: Option<String>,
    http: reqwest::Client,
}

impl Reporter {
    pub fn new(callback_url: Option<String>) -> Self {
        Self {
            callback_url: callback_url.filter(|url| !url.trim().is_empty()),
            http: reqwest::Client::new(),
        }
    }

    pub fn callback_url(&self) -> Option<&str> {
        self.callback_url.as_deref()
    }

    /// Log `result` and, if configured, send it to the callback URL.
    pub fn report(&self, job_id: Option<&str>, result: &PrintResult) {
        if result.success {
            tracing::info!(job_id = ?job_id, "Print job completed");
        } else {
            tracing::error!(job_id = ?job_id, message = %result.message, "Print job failed");
        }

        let Some(url) = self.callback_url.clone() else {
            return;
        };
        let body = callback_body(job_id, result);
        let http = self.http.clone();
        tokio::spawn(async move {
            let sent = http
                .post(&url)
                .json(&body)
                .timeout(CALLBACK_TIMEOUT)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = sent {
                tracing::warn!(%url, error = %e, "Failed to report print result");
            }
        });
    }
}

pub fn callback_body(job_id: Option<&str>, result: &PrintResult) -> Value {
    json!({
        "jobId": job_id,
        "success": result.success,
        "message": result.message,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::post;
    use tokio::sync::mpsc;

    #[test]
    fn test_callback_body() {
        let body = callback_body(Some("print_1"), &PrintResult::failed("Missing content"));

        assert_eq!(body["jobId"], "print_1");
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Missing content");
        assert!(chrono::DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_blank_callback_is_none() {
        assert_eq!(Reporter::new(Some("  ".into())).callback_url(), None);
        assert_eq!(Reporter::new(None).callback_url(), None);
    }

    #[tokio::test]
    async fn test_report_posts_to_callback() {
        let (tx, mut rx) = mpsc::channel::<Value>(1);
        let app = Router::new().route(
            "/done",
            post(move |axum::Json(body): axum::Json<Value>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(body).await;
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let reporter = Reporter::new(Some(format!("http://{}/done", addr)));
        reporter.report(Some("job-9"), &PrintResult::ok("Print job sent successfully"));

        let body = rx.recv().await.unwrap();
        assert_eq!(body["jobId"], "job-9");
        assert_eq!(body["success"], true);
    }
}
