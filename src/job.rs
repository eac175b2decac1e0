//! # Print Jobs
//!
//! The only domain entity: one request to render and print a content source.
//!
//! Jobs are transient. A [`PrintJob`] is built when a request or a pushed
//! event arrives, driven through the [`JobExecutor`](crate::executor::JobExecutor),
//! and dropped once its [`PrintResult`] has been delivered.
//!
//! ## Wire Format
//!
//! All entry points (HTTP endpoints and the three push drivers) share the
//! same camelCase payload:
//!
//! ```json
//! {
//!   "jobId": "print_65f1c2",
//!   "html": "<h1>Order #42</h1>",
//!   "printerName": "EPSON_TM_T20",
//!   "options": { "pageSize": "A4", "landscape": true }
//! }
//! ```

use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PrintError;

/// Engine options for one print call (`silent`, `pageSize`, `landscape`, ...).
pub type PrintOptions = serde_json::Map<String, Value>;

/// Characters left alone by JavaScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Shallow merge: keys of `overrides` replace keys of `base`.
pub fn merge_options(base: &PrintOptions, overrides: &PrintOptions) -> PrintOptions {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// The family of content a job prints.
///
/// Drives validation messages, the settle delay and the default for
/// `printBackground`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Url,
    Pdf,
}

impl ContentKind {
    /// Fixed wait before printing when the surface gives no load signal.
    pub fn settle_delay(self) -> Duration {
        match self {
            ContentKind::Html => Duration::from_millis(500),
            ContentKind::Url => Duration::from_millis(1000),
            ContentKind::Pdf => Duration::from_millis(1500),
        }
    }

    /// Message returned when the required content field is absent.
    pub fn required_message(self) -> &'static str {
        match self {
            ContentKind::Html => "HTML content is required",
            ContentKind::Url => "URL is required",
            ContentKind::Pdf => "PDF URL or Base64 data is required",
        }
    }

    /// PDFs carry their own backgrounds.
    pub fn prints_background(self) -> bool {
        !matches!(self, ContentKind::Pdf)
    }

    pub(crate) fn success_message(self) -> &'static str {
        match self {
            ContentKind::Pdf => "PDF printed successfully",
            _ => "Print job sent successfully",
        }
    }

    pub(crate) fn failure_prefix(self) -> &'static str {
        match self {
            ContentKind::Pdf => "PDF print failed",
            _ => "Print failed",
        }
    }
}

/// Exactly one content source per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// Inline HTML document
    Html(String),
    /// Page to load and print
    Url(String),
    /// Remote PDF document
    PdfUrl(String),
    /// PDF document as standard Base64
    PdfBase64(String),
}

impl ContentSource {
    pub fn kind(&self) -> ContentKind {
        match self {
            ContentSource::Html(_) => ContentKind::Html,
            ContentSource::Url(_) => ContentKind::Url,
            ContentSource::PdfUrl(_) | ContentSource::PdfBase64(_) => ContentKind::Pdf,
        }
    }

    /// Reject addresses the rendering surface must never see.
    ///
    /// Page and PDF URLs must be absolute `http`, `https`, `file` or `data`
    /// URLs. Anything else (including strings that look like command line
    /// switches) is a validation failure.
    pub fn validate(&self) -> Result<(), PrintError> {
        match self {
            ContentSource::Url(url) | ContentSource::PdfUrl(url) => check_url(url),
            ContentSource::Html(_) | ContentSource::PdfBase64(_) => Ok(()),
        }
    }

    /// The address handed to the rendering surface.
    ///
    /// Inline HTML becomes a percent-encoded `data:` URI and Base64 PDFs an
    /// `application/pdf` data URI; URLs pass through untouched.
    pub fn load_url(&self) -> String {
        match self {
            ContentSource::Html(html) => format!(
                "data:text/html;charset=utf-8,{}",
                utf8_percent_encode(html, URI_COMPONENT)
            ),
            ContentSource::Url(url) | ContentSource::PdfUrl(url) => url.clone(),
            ContentSource::PdfBase64(data) => format!("data:application/pdf;base64,{}", data),
        }
    }
}

/// URL schemes a job may load.
pub const ALLOWED_SCHEMES: [&str; 4] = ["http", "https", "file", "data"];

/// Accept only absolute URLs with one of [`ALLOWED_SCHEMES`].
pub fn check_url(url: &str) -> Result<(), PrintError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| PrintError::Validation(format!("Invalid URL '{}': {}", url, e)))?;
    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(PrintError::Validation(format!(
            "Unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }
    Ok(())
}

/// A validated job ready for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintJob {
    /// Submitter's identifier; only set on the push path
    pub job_id: Option<String>,
    pub source: ContentSource,
    /// Target printer; `None` means the configured or OS default
    pub printer_name: Option<String>,
    pub options: PrintOptions,
}

impl PrintJob {
    pub fn new(source: ContentSource) -> Self {
        Self {
            job_id: None,
            source,
            printer_name: None,
            options: PrintOptions::new(),
        }
    }

    pub fn with_printer(mut self, printer: impl Into<String>) -> Self {
        self.printer_name = Some(printer.into());
        self
    }

    pub fn with_options(mut self, options: PrintOptions) -> Self {
        self.options = options;
        self
    }

    pub fn kind(&self) -> ContentKind {
        self.source.kind()
    }
}

/// Outcome of a job: the only shape callers ever see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintResult {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

impl PrintResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<PrintError> for PrintResult {
    fn from(e: PrintError) -> Self {
        PrintResult::failed(e.to_string())
    }
}

/// Request body / pushed event as it arrives on the wire.
///
/// Decoding is per field: a field with an unexpected type is treated as
/// absent instead of failing the whole payload. A numeric `jobId` is kept
/// as its decimal string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    #[serde(
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub job_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub html: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub url: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub pdf_url: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub pdf_base64: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub printer_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_options",
        skip_serializing_if = "Option::is_none"
    )]
    pub options: Option<PrintOptions>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
}

/// A string field; any other JSON type is absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Job identifiers arrive as strings or, from some queues, as numbers.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Accept an options object, treating `null` or a list (an empty PHP array
/// encodes as `[]`) as absent.
fn lenient_options<'de, D>(deserializer: D) -> Result<Option<PrintOptions>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => Some(map),
        _ => None,
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

impl JobPayload {
    /// Decode a payload from an arbitrary JSON value.
    ///
    /// Anything that is not an object decodes to an empty payload, which
    /// then fails validation like any other job without content.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Content source for an endpoint that only accepts one family.
    pub fn source_for(&self, kind: ContentKind) -> Option<ContentSource> {
        match kind {
            ContentKind::Html => non_empty(&self.html).map(ContentSource::Html),
            ContentKind::Url => non_empty(&self.url).map(ContentSource::Url),
            ContentKind::Pdf => non_empty(&self.pdf_url)
                .map(ContentSource::PdfUrl)
                .or_else(|| non_empty(&self.pdf_base64).map(ContentSource::PdfBase64)),
        }
    }

    /// First present source in the order html, url, pdfUrl, pdfBase64.
    pub fn first_source(&self) -> Option<ContentSource> {
        self.source_for(ContentKind::Html)
            .or_else(|| self.source_for(ContentKind::Url))
            .or_else(|| self.source_for(ContentKind::Pdf))
    }

    /// Validate the payload for `kind` and build the job.
    pub fn into_job(self, kind: ContentKind) -> Result<PrintJob, PrintError> {
        let source = self
            .source_for(kind)
            .ok_or_else(|| PrintError::Validation(kind.required_message().to_string()))?;
        source.validate()?;
        Ok(self.with_source(source))
    }

    pub(crate) fn with_source(self, source: ContentSource) -> PrintJob {
        PrintJob {
            job_id: self.job_id,
            source,
            printer_name: self.printer_name.filter(|p| !p.is_empty()),
            options: self.options.unwrap_or_default(),
        }
    }
}
