//! # Rendering Engines
//!
//! The executor never talks to a browser or a print spooler directly. It
//! goes through two traits:
//!
//! - [`RenderEngine`]: hands out one hidden [`Surface`] per job and lists
//!   the printers visible to the OS
//! - [`Surface`]: loads a document, prints it, and is closed afterwards
//!
//! ## Available Engines
//!
//! - [`chromium`]: headless Chromium renders HTML/URLs to PDF, CUPS prints
//! - [`memory`]: records every call; used for dry runs and tests

pub mod chromium;
pub mod memory;

pub use chromium::ChromiumEngine;
pub use memory::MemoryEngine;

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use crate::error::{PrintError, Result};
use crate::job::{ContentKind, PrintOptions};

/// What a surface knows after `load` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// The engine saw the document finish loading and laying out.
    Ready,
    /// No completion signal is available; the caller has to wait it out.
    Unknown,
}

/// Result reported by the native print call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintOutcome {
    Printed,
    /// The print subsystem refused the job; carries its error classifier.
    Failed(String),
}

/// One printer as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub is_default: bool,
    /// Driver-specific attributes (e.g. `device-uri`)
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl PrinterInfo {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: String::new(),
            status: String::new(),
            is_default: false,
            options: BTreeMap::new(),
        }
    }

    pub fn default_printer(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// A hidden rendering context scoped to a single job.
#[async_trait]
pub trait Surface: Send {
    /// Load the document at `url` (http(s), file or data URI).
    async fn load(&mut self, url: &str) -> Result<LoadState>;

    /// Print the loaded document.
    ///
    /// `Ok(PrintOutcome::Failed)` means the print subsystem answered with an
    /// error; `Err` means the call itself could not be made.
    async fn print(&mut self, options: &PrintOptions) -> Result<PrintOutcome>;

    /// Release everything the surface holds. Called exactly once per surface.
    async fn close(&mut self);
}

/// Factory for surfaces plus printer discovery.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Allocate a new surface for a job of the given kind.
    async fn open_surface(&self, kind: ContentKind) -> Result<Box<dyn Surface>>;

    /// Printers visible to the OS, in the order the OS lists them.
    async fn printers(&self) -> Result<Vec<PrinterInfo>>;
}

/// A decoded `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Decode `data:[<mime>][;charset=...][;base64],<payload>`.
pub fn decode_data_uri(uri: &str) -> Result<DataUri> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| PrintError::Validation(format!("not a data URI: {}", truncate(uri))))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| PrintError::Validation("data URI has no payload".to_string()))?;

    let mut parts = header.split(';');
    let mime = match parts.next() {
        Some(m) if !m.is_empty() => m.to_ascii_lowercase(),
        _ => "text/plain".to_string(),
    };
    let is_base64 = parts.any(|p| p.eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        let cleaned: String = percent_decode_str(payload)
            .decode_utf8_lossy()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| PrintError::Validation(format!("invalid Base64 payload: {}", e)))?
    } else {
        percent_decode_str(payload).collect()
    };

    Ok(DataUri { mime, bytes })
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(48) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
