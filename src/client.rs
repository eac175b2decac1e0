//! # Client Library
//!
//! Submit print jobs to a running agent over its HTTP intake API.
//!
//! Every operation returns a [`PrintResult`] (or an empty/false value for the
//! query helpers); transport problems never surface as `Err`.
//!
//! ## Example
//!
//! ```no_run
//! use printbridge::client::PrintClient;
//! use printbridge::config::ClientConfig;
//!
//! # async fn demo() -> printbridge::error::Result<()> {
//! let client = PrintClient::new(ClientConfig::from_env())?;
//!
//! // Named profile from the configuration
//! let result = client.print_html("<h1>Receipt</h1>", None, "thermal_80mm").await;
//! assert!(result.success, "{}", result.message);
//!
//! // Explicit options, merged over the defaults
//! let mut options = serde_json::Map::new();
//! options.insert("landscape".into(), true.into());
//! client.print_url("https://example.com/invoice/42", Some("Office"), options).await;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::ClientConfig;
use crate::engine::PrinterInfo;
use crate::error::Result;
use crate::job::{PrintOptions, PrintResult, merge_options};

const DISABLED: &str = "Print service is disabled";

/// Per-call options: an explicit map or the name of a configured profile.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionsArg {
    Map(PrintOptions),
    Profile(String),
}

impl Default for OptionsArg {
    fn default() -> Self {
        OptionsArg::Map(PrintOptions::new())
    }
}

impl From<PrintOptions> for OptionsArg {
    fn from(options: PrintOptions) -> Self {
        OptionsArg::Map(options)
    }
}

impl From<&str> for OptionsArg {
    fn from(profile: &str) -> Self {
        OptionsArg::Profile(profile.to_string())
    }
}

impl From<String> for OptionsArg {
    fn from(profile: String) -> Self {
        OptionsArg::Profile(profile)
    }
}

impl From<Option<PrintOptions>> for OptionsArg {
    fn from(options: Option<PrintOptions>) -> Self {
        OptionsArg::Map(options.unwrap_or_default())
    }
}

#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error(transparent)]
    Encode(#[from] serde_json::Error),

    #[error("payload of {size} bytes exceeds the {limit_mb} MB limit")]
    TooLarge { size: usize, limit_mb: u64 },
}

impl RequestError {
    /// Only failures where the request never reached the agent are retried;
    /// anything else may already have printed.
    fn is_retryable(&self) -> bool {
        matches!(self, RequestError::Http(e) if e.is_connect())
    }
}

#[derive(Debug, Deserialize)]
struct PrintersResponse {
    #[serde(default)]
    printers: Vec<PrinterInfo>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    success: bool,
}

/// HTTP client for the agent's intake API.
#[derive(Debug, Clone)]
pub struct PrintClient {
    config: ClientConfig,
    base_url: String,
    http: reqwest::Client,
}

impl PrintClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;
        let base_url = config.service_url.trim_end_matches('/').to_string();
        Ok(Self {
            config,
            base_url,
            http,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Options sent with a job: the configured defaults overlaid with the
    /// map, or with the named profile. An unknown profile leaves the
    /// defaults untouched.
    pub fn resolve_options(&self, options: &OptionsArg) -> PrintOptions {
        let defaults = &self.config.default_options;
        match options {
            OptionsArg::Map(map) => merge_options(defaults, map),
            OptionsArg::Profile(name) => match self.config.profiles.get(name) {
                Some(profile) => merge_options(defaults, profile),
                None => {
                    tracing::debug!(profile = %name, "Unknown print profile, using defaults");
                    defaults.clone()
                }
            },
        }
    }

    pub async fn print_html(
        &self,
        html: &str,
        printer: Option<&str>,
        options: impl Into<OptionsArg>,
    ) -> PrintResult {
        self.submit("html", "/print", ("html", html), printer, options.into())
            .await
    }

    pub async fn print_url(
        &self,
        url: &str,
        printer: Option<&str>,
        options: impl Into<OptionsArg>,
    ) -> PrintResult {
        self.submit("url", "/print-url", ("url", url), printer, options.into())
            .await
    }

    pub async fn print_pdf_url(
        &self,
        pdf_url: &str,
        printer: Option<&str>,
        options: impl Into<OptionsArg>,
    ) -> PrintResult {
        self.submit("pdf_url", "/print-pdf", ("pdfUrl", pdf_url), printer, options.into())
            .await
    }

    pub async fn print_pdf_base64(
        &self,
        pdf_base64: &str,
        printer: Option<&str>,
        options: impl Into<OptionsArg>,
    ) -> PrintResult {
        self.submit(
            "pdf_base64",
            "/print-pdf",
            ("pdfBase64", pdf_base64),
            printer,
            options.into(),
        )
        .await
    }

    /// Read a PDF from disk and send it inline.
    pub async fn print_pdf_file(
        &self,
        path: impl AsRef<Path>,
        printer: Option<&str>,
        options: impl Into<OptionsArg>,
    ) -> PrintResult {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return PrintResult::failed(format!("PDF file not found: {}", path.display()));
            }
            Err(e) => {
                return PrintResult::failed(format!("Failed to read {}: {}", path.display(), e));
            }
        };
        self.print_pdf_base64(&STANDARD.encode(bytes), printer, options)
            .await
    }

    /// Printers known to the agent; empty when disabled or unreachable.
    pub async fn printers(&self) -> Vec<PrinterInfo> {
        if !self.config.enabled {
            return Vec::new();
        }
        let fetched = async {
            let response = self
                .http
                .get(format!("{}/printers", self.base_url))
                .send()
                .await?
                .error_for_status()?;
            response.json::<PrintersResponse>().await
        };
        match fetched.await {
            Ok(body) => body.printers,
            Err(e) => {
                if self.config.logging.enabled {
                    tracing::error!(channel = %self.config.logging.channel, error = %e, "Failed to get printers");
                }
                Vec::new()
            }
        }
    }

    /// Whether the agent answers `/health` with `success: true`.
    pub async fn is_healthy(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let checked = async {
            let response = self
                .http
                .get(format!("{}/health", self.base_url))
                .send()
                .await?
                .error_for_status()?;
            response.json::<HealthResponse>().await
        };
        checked.await.map(|h| h.success).unwrap_or(false)
    }

    async fn submit(
        &self,
        kind: &'static str,
        path: &str,
        (field, content): (&str, &str),
        printer: Option<&str>,
        options: OptionsArg,
    ) -> PrintResult {
        if !self.config.enabled {
            return PrintResult::failed(DISABLED);
        }

        let printer = printer
            .map(str::to_string)
            .or_else(|| self.config.default_printer.clone());
        let mut body = json!({
            "printerName": printer,
            "options": self.resolve_options(&options),
        });
        body[field] = Value::String(content.to_string());

        match self.send(path, &body).await {
            Ok(result) => {
                if self.config.logging.enabled {
                    tracing::info!(
                        channel = %self.config.logging.channel,
                        job_type = kind,
                        printer = ?printer,
                        success = result.success,
                        "Print job sent"
                    );
                }
                result
            }
            Err(e) => {
                let message = format!("Print service error: {}", e);
                if self.config.logging.enabled {
                    tracing::error!(channel = %self.config.logging.channel, job_type = kind, "{}", message);
                }
                PrintResult::failed(message)
            }
        }
    }

    /// POST `body`, retrying connection failures per the retry settings.
    async fn send(&self, path: &str, body: &Value) -> std::result::Result<PrintResult, RequestError> {
        let bytes = serde_json::to_vec(body)?;
        let limit = self.config.max_payload_bytes();
        if limit > 0 && bytes.len() as u64 > limit {
            return Err(RequestError::TooLarge {
                size: bytes.len(),
                limit_mb: self.config.max_payload_size_mb,
            });
        }

        let url = format!("{}{}", self.base_url, path);
        let attempts = self.config.retry.attempts();
        let mut attempt = 1;
        loop {
            match self.post_once(&url, bytes.clone()).await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Print service unreachable, retrying"
                    );
                    tokio::time::sleep(self.config.retry.delay()).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn post_once(&self, url: &str, body: Vec<u8>) -> std::result::Result<PrintResult, RequestError> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<PrintResult>(&text)
                .map(|r| r.message)
                .unwrap_or(text);
            return Err(RequestError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<PrintResult>().await?)
    }
}
