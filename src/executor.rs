//! # Job Executor
//!
//! Drives one [`PrintJob`] through a rendering engine:
//!
//! ```text
//! validate ─► admit ─► open surface ─► load ─► settle ─► print ─► close ─► PrintResult
//!    │                                   │                 │
//!    └─ 400-style failure,               └── any error ────┴─► close ─► failure
//!       no surface allocated
//! ```
//!
//! ## Settling
//!
//! When the surface reports that the document finished loading
//! ([`LoadState::Ready`]) the print starts right away. Otherwise the
//! executor waits the fixed settle delay of the content kind (500 ms HTML,
//! 1000 ms URL, 1500 ms PDF). Loading is bounded by the configured load
//! timeout either way.
//!
//! ## Admission
//!
//! At most `max_concurrent_jobs` surfaces exist at once. Further jobs wait
//! for a slot before anything is allocated.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::Semaphore;

use crate::config::AgentConfig;
use crate::engine::{LoadState, PrintOutcome, PrinterInfo, RenderEngine, Surface};
use crate::error::{PrintError, Result};
use crate::job::{ContentKind, JobPayload, PrintJob, PrintOptions, PrintResult, merge_options};

/// Message for pushed jobs that carry no content at all.
pub const MISSING_CONTENT: &str = "Missing content";

/// Executor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Printer used when the job names none
    pub default_printer: Option<String>,
    /// Zero means unbounded
    pub max_concurrent_jobs: usize,
    pub load_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_printer: None,
            max_concurrent_jobs: 4,
            load_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&AgentConfig> for ExecutorConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            default_printer: config.default_printer.clone().filter(|p| !p.is_empty()),
            max_concurrent_jobs: config.max_concurrent_jobs,
            load_timeout: Duration::from_millis(config.engine.load_timeout_ms),
        }
    }
}

pub struct JobExecutor {
    engine: Arc<dyn RenderEngine>,
    config: ExecutorConfig,
    permits: Semaphore,
}

impl JobExecutor {
    pub fn new(engine: Arc<dyn RenderEngine>, config: ExecutorConfig) -> Self {
        let permits = match config.max_concurrent_jobs {
            0 => Semaphore::MAX_PERMITS,
            n => n,
        };
        Self {
            engine,
            config,
            permits: Semaphore::new(permits),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Printer list from the engine's primary context.
    pub async fn printers(&self) -> Result<Vec<PrinterInfo>> {
        self.engine.printers().await
    }

    /// Validate a payload for `kind`, then execute it.
    ///
    /// A payload without the required content fails before any surface is
    /// allocated.
    pub async fn submit(&self, kind: ContentKind, payload: JobPayload) -> PrintResult {
        match payload.into_job(kind) {
            Ok(job) => self.execute(&job).await,
            Err(e) => e.into(),
        }
    }

    /// Execute a pushed payload using whichever content source it carries.
    pub async fn execute_payload(&self, payload: JobPayload) -> PrintResult {
        match payload.first_source() {
            Some(source) => match source.validate() {
                Ok(()) => self.execute(&payload.with_source(source)).await,
                Err(e) => e.into(),
            },
            None => PrintResult::failed(MISSING_CONTENT),
        }
    }

    /// Options passed to the print call: the fixed base merged with the
    /// job's own options, job keys winning.
    pub fn print_options(&self, job: &PrintJob) -> PrintOptions {
        let device = job
            .printer_name
            .as_deref()
            .or(self.config.default_printer.as_deref())
            .unwrap_or("");

        let mut base = PrintOptions::new();
        base.insert("silent".to_string(), Value::Bool(true));
        base.insert(
            "printBackground".to_string(),
            Value::Bool(job.kind().prints_background()),
        );
        base.insert("deviceName".to_string(), json!(device));

        merge_options(&base, &job.options)
    }

    /// Run one job to completion.
    pub async fn execute(&self, job: &PrintJob) -> PrintResult {
        let kind = job.kind();
        let job_id = job.job_id.as_deref().unwrap_or("-");

        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return PrintResult::failed("Print executor is shut down"),
        };

        let mut surface = match self.engine.open_surface(kind).await {
            Ok(surface) => surface,
            Err(e) => {
                tracing::error!(job_id, ?kind, error = %e, "Failed to open surface");
                return e.into();
            }
        };

        let outcome = self.drive(surface.as_mut(), job).await;
        surface.close().await;

        match outcome {
            Ok(PrintOutcome::Printed) => {
                tracing::info!(job_id, ?kind, "Print job completed");
                PrintResult::ok(kind.success_message())
            }
            Ok(PrintOutcome::Failed(classifier)) => {
                tracing::error!(job_id, ?kind, %classifier, "Print job failed");
                PrintResult::failed(format!("{}: {}", kind.failure_prefix(), classifier))
            }
            Err(e) => {
                tracing::error!(job_id, ?kind, error = %e, "Print error");
                e.into()
            }
        }
    }

    async fn drive(&self, surface: &mut dyn Surface, job: &PrintJob) -> Result<PrintOutcome> {
        let kind = job.kind();
        let url = job.source.load_url();

        let state = tokio::time::timeout(self.config.load_timeout, surface.load(&url))
            .await
            .map_err(|_| {
                PrintError::Execution(format!(
                    "Timed out loading content after {}ms",
                    self.config.load_timeout.as_millis()
                ))
            })??;

        if state == LoadState::Unknown {
            tokio::time::sleep(kind.settle_delay()).await;
        }

        surface.print(&self.print_options(job)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::job::ContentSource;
    use serde_json::json;

    fn executor(engine: &MemoryEngine) -> JobExecutor {
        JobExecutor::new(Arc::new(engine.clone()), ExecutorConfig::default())
    }

    #[tokio::test]
    async fn test_missing_content_allocates_nothing() {
        let engine = MemoryEngine::new();
        let executor = executor(&engine);

        for kind in [ContentKind::Html, ContentKind::Url, ContentKind::Pdf] {
            let result = executor.submit(kind, JobPayload::default()).await;
            assert!(!result.success);
            assert_eq!(result.message, kind.required_message());
        }
        assert_eq!(engine.surfaces_opened(), 0);
    }

    #[tokio::test]
    async fn test_html_job_prints_on_default_printer() {
        let engine = MemoryEngine::new();
        let job = PrintJob::new(ContentSource::Html("<p>hi</p>".into()));

        let result = executor(&engine).execute(&job).await;

        assert_eq!(result, PrintResult::ok("Print job sent successfully"));
        let calls = engine.print_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].options["deviceName"], "");
        assert_eq!(calls[0].options["silent"], true);
        assert_eq!(calls[0].options["printBackground"], true);
        assert!(calls[0].url.starts_with("data:text/html;charset=utf-8,%3Cp%3E"));
        assert_eq!(engine.surfaces_closed(), 1);
    }

    #[tokio::test]
    async fn test_configured_default_printer_is_used() {
        let engine = MemoryEngine::new();
        let config = ExecutorConfig {
            default_printer: Some("Front Desk".into()),
            ..Default::default()
        };
        let executor = JobExecutor::new(Arc::new(engine.clone()), config);

        executor
            .execute(&PrintJob::new(ContentSource::Url("https://example.com".into())))
            .await;
        executor
            .execute(
                &PrintJob::new(ContentSource::Url("https://example.com".into()))
                    .with_printer("Kitchen"),
            )
            .await;

        let calls = engine.print_calls();
        assert_eq!(calls[0].options["deviceName"], "Front Desk");
        assert_eq!(calls[1].options["deviceName"], "Kitchen");
    }

    #[tokio::test]
    async fn test_pdf_defaults_and_caller_overrides() {
        let engine = MemoryEngine::new();
        let options = json!({"printBackground": true, "silent": false, "landscape": true});
        let job = PrintJob::new(ContentSource::PdfUrl("https://example.com/a.pdf".into()))
            .with_options(options.as_object().cloned().unwrap());

        let result = executor(&engine).execute(&job).await;
        assert_eq!(result.message, "PDF printed successfully");

        let options = &engine.print_calls()[0].options;
        assert_eq!(options["printBackground"], true);
        assert_eq!(options["silent"], false);
        assert_eq!(options["landscape"], true);

        let plain = PrintJob::new(ContentSource::PdfBase64("JVBERi0x".into()));
        let executor = executor(&engine);
        assert_eq!(executor.print_options(&plain)["printBackground"], false);
    }

    #[tokio::test]
    async fn test_rejected_print_embeds_classifier() {
        let engine = MemoryEngine::new().rejecting_print("Printer is out of paper");

        let html = executor(&engine)
            .execute(&PrintJob::new(ContentSource::Html("<p/>".into())))
            .await;
        assert_eq!(html, PrintResult::failed("Print failed: Printer is out of paper"));

        let pdf = executor(&engine)
            .execute(&PrintJob::new(ContentSource::PdfBase64("JVBERi0x".into())))
            .await;
        assert_eq!(pdf.message, "PDF print failed: Printer is out of paper");
        assert_eq!(engine.surfaces_closed(), 2);
    }

    #[tokio::test]
    async fn test_surface_released_when_load_fails() {
        let engine = MemoryEngine::new().failing_load("net::ERR_NAME_NOT_RESOLVED");

        let result = executor(&engine)
            .execute(&PrintJob::new(ContentSource::Url("https://nope.invalid".into())))
            .await;

        assert_eq!(result, PrintResult::failed("net::ERR_NAME_NOT_RESOLVED"));
        assert_eq!(engine.surfaces_opened(), 1);
        assert_eq!(engine.surfaces_closed(), 1);
        assert!(engine.print_calls().is_empty());
    }

    #[tokio::test]
    async fn test_surface_released_when_print_errors() {
        let engine = MemoryEngine::new().erroring_print("print() threw");

        let result = executor(&engine)
            .execute(&PrintJob::new(ContentSource::Html("<p/>".into())))
            .await;

        assert_eq!(result, PrintResult::failed("print() threw"));
        assert_eq!(engine.surfaces_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_without_load_signal() {
        let engine = MemoryEngine::new().without_load_signal();
        let executor = executor(&engine);
        let started = tokio::time::Instant::now();

        executor
            .execute(&PrintJob::new(ContentSource::PdfUrl("https://example.com/a.pdf".into())))
            .await;

        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_settle_delay_with_load_signal() {
        let engine = MemoryEngine::new();
        let executor = executor(&engine);
        let started = tokio::time::Instant::now();

        executor
            .execute(&PrintJob::new(ContentSource::PdfUrl("https://example.com/a.pdf".into())))
            .await;

        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_execute_payload_picks_first_source() {
        let engine = MemoryEngine::new();
        let payload = JobPayload {
            job_id: Some("a".into()),
            url: Some("https://example.com".into()),
            ..Default::default()
        };

        let result = executor(&engine).execute_payload(payload).await;

        assert!(result.success);
        assert_eq!(engine.print_calls()[0].kind, ContentKind::Url);
    }

    #[tokio::test]
    async fn test_execute_payload_without_content() {
        let engine = MemoryEngine::new();
        let result = executor(&engine).execute_payload(JobPayload::default()).await;

        assert_eq!(result, PrintResult::failed(MISSING_CONTENT));
        assert_eq!(engine.surfaces_opened(), 0);
    }

    #[tokio::test]
    async fn test_execute_payload_rejects_switch_like_url() {
        let engine = MemoryEngine::new();
        let payload = JobPayload {
            job_id: Some("a".into()),
            url: Some("--renderer-cmd-prefix=sh".into()),
            ..Default::default()
        };

        let result = executor(&engine).execute_payload(payload).await;

        assert!(!result.success);
        assert!(result.message.starts_with("Invalid URL"), "{}", result.message);
        assert_eq!(engine.surfaces_opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout_fails_and_closes_surface() {
        let engine = MemoryEngine::new().hanging_load();
        let config = ExecutorConfig {
            load_timeout: Duration::from_millis(250),
            ..Default::default()
        };
        let executor = JobExecutor::new(Arc::new(engine.clone()), config);

        let result = executor
            .execute(&PrintJob::new(ContentSource::Url("https://example.com".into())))
            .await;

        assert_eq!(
            result,
            PrintResult::failed("Timed out loading content after 250ms")
        );
        assert_eq!(engine.surfaces_opened(), 1);
        assert_eq!(engine.surfaces_closed(), 1);
        assert!(engine.print_calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_jobs_all_complete_under_limit() {
        let engine = MemoryEngine::new();
        let config = ExecutorConfig {
            max_concurrent_jobs: 1,
            ..Default::default()
        };
        let executor = Arc::new(JobExecutor::new(Arc::new(engine.clone()), config));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let executor = executor.clone();
                tokio::spawn(async move {
                    executor
                        .execute(&PrintJob::new(ContentSource::Html(format!("<p>{}</p>", i))))
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().success);
        }

        assert_eq!(engine.surfaces_opened(), 5);
        assert_eq!(engine.surfaces_closed(), 5);
    }
}
