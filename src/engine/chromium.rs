//! # Headless Chromium + CUPS Engine
//!
//! Renders with a headless Chromium and prints through the CUPS command
//! line tools:
//!
//! | Step | Tool |
//! |------|------|
//! | HTML / URL → PDF | `chromium --headless --print-to-pdf=<file> -- <url>` |
//! | PDF URL | downloaded with reqwest |
//! | PDF Base64 | decoded in-process |
//! | print | `lp -d <printer> [-o ...] <file>` |
//! | printer list | `lpstat -p -d -v` |
//!
//! Chromium only exits once the page has loaded and been laid out, so a
//! successful render is an explicit load-complete signal
//! ([`LoadState::Ready`]). Every surface owns a temporary directory that is
//! removed when the surface closes.
//!
//! ## Option Mapping
//!
//! | Option | `lp` argument |
//! |--------|---------------|
//! | `deviceName` | `-d <name>` (omitted when empty: OS default) |
//! | `copies` | `-n <copies>` |
//! | `landscape: true` | `-o landscape` |
//! | `pageSize: "A4"` | `-o media=A4` |
//! | `pageSize: {width, height}` (microns) | `-o media=Custom.<w>x<h>mm` |
//! | `duplexMode` | `-o sides=...` |
//! | `color: false` | `-o print-color-mode=monochrome` |
//! | `scaleFactor` (≠ 100) | `-o scaling=<n>` |
//! | `pageRanges: [{from, to}]` (0-based) | `-o page-ranges=<from+1>-<to+1>` |
//!
//! `silent`, `printBackground`, `marginsType` and `preferCSSPageSize` have
//! no spooler counterpart and are ignored here.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::sync::Mutex;

use super::{LoadState, PrintOutcome, PrinterInfo, RenderEngine, Surface, decode_data_uri};
use crate::config::EngineConfig;
use crate::error::{PrintError, Result};
use crate::job::{ContentKind, PrintOptions, check_url};

/// Engine backed by a Chromium executable and the CUPS client tools.
pub struct ChromiumEngine {
    config: EngineConfig,
    http: reqwest::Client,
    /// Printer enumeration goes through one primary context at a time.
    primary: Mutex<()>,
}

impl ChromiumEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            primary: Mutex::new(()),
        }
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn open_surface(&self, kind: ContentKind) -> Result<Box<dyn Surface>> {
        let dir = tempfile::Builder::new()
            .prefix("printbridge-job-")
            .tempdir()
            .map_err(|e| PrintError::Execution(format!("Failed to create job directory: {}", e)))?;

        tracing::debug!(dir = %dir.path().display(), ?kind, "Opened surface");

        Ok(Box::new(ChromiumSurface {
            config: self.config.clone(),
            http: self.http.clone(),
            kind,
            dir: Some(dir),
            document: None,
        }))
    }

    async fn printers(&self) -> Result<Vec<PrinterInfo>> {
        let _primary = self.primary.lock().await;

        let output = Command::new(&self.config.lpstat_path)
            .arg("-p")
            .arg("-d")
            .arg("-v")
            .env("LC_ALL", "C")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PrintError::Execution(format!(
                    "Failed to run '{} -p -d': {}",
                    self.config.lpstat_path, e
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        // lpstat exits non-zero when no printers are installed but still
        // prints what it knows.
        if !output.status.success() && stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No destinations added") {
                return Ok(Vec::new());
            }
            return Err(PrintError::Execution(format!(
                "lpstat failed: {}",
                stderr.trim()
            )));
        }

        Ok(parse_lpstat(&stdout))
    }
}

/// One job's scratch space and loaded document.
struct ChromiumSurface {
    config: EngineConfig,
    http: reqwest::Client,
    kind: ContentKind,
    dir: Option<TempDir>,
    /// PDF ready for the spooler, set by a successful load
    document: Option<PathBuf>,
}

impl ChromiumSurface {
    fn dir(&self) -> Result<&Path> {
        self.dir
            .as_ref()
            .map(|d| d.path())
            .ok_or_else(|| PrintError::Execution("surface is closed".to_string()))
    }

    /// Render `target` to `out` with headless Chromium.
    async fn render(&self, target: &str, out: &Path) -> Result<()> {
        let output = Command::new(&self.config.chromium_path)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-pdf-header-footer")
            .arg("--run-all-compositor-stages-before-draw")
            .arg(format!("--print-to-pdf={}", out.display()))
            .arg("--")
            .arg(target)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PrintError::Execution(format!(
                    "Failed to run '{}': {}",
                    self.config.chromium_path, e
                ))
            })?;

        if !output.status.success() || !out.exists() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PrintError::Execution(format!(
                "Render failed ({}): {}",
                output.status,
                last_line(&stderr)
            )));
        }
        Ok(())
    }

    async fn download(&self, url: &str, out: &Path) -> Result<()> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PrintError::Transport(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(out, &bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl Surface for ChromiumSurface {
    async fn load(&mut self, url: &str) -> Result<LoadState> {
        check_url(url)?;
        let dir = self.dir()?.to_path_buf();
        let out = dir.join("document.pdf");

        if url.starts_with("data:") {
            let data = decode_data_uri(url)?;
            if data.mime == "application/pdf" {
                tokio::fs::write(&out, &data.bytes).await?;
            } else {
                let page = dir.join("page.html");
                tokio::fs::write(&page, &data.bytes).await?;
                self.render(&format!("file://{}", page.display()), &out)
                    .await?;
            }
        } else if self.kind == ContentKind::Pdf {
            match url.strip_prefix("file://") {
                Some(path) => {
                    tokio::fs::copy(path, &out).await?;
                }
                None => self.download(url, &out).await?,
            }
        } else {
            self.render(url, &out).await?;
        }

        self.document = Some(out);
        Ok(LoadState::Ready)
    }

    async fn print(&mut self, options: &PrintOptions) -> Result<PrintOutcome> {
        let document = self
            .document
            .clone()
            .ok_or_else(|| PrintError::Execution("nothing loaded".to_string()))?;

        let args = lp_args(options);
        tracing::debug!(?args, "Submitting to spooler");

        let output = Command::new(&self.config.lp_path)
            .args(&args)
            .arg(&document)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PrintError::Execution(format!("Failed to run '{}': {}", self.config.lp_path, e))
            })?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            tracing::info!(spooler = %stdout.trim(), "Spooler accepted job");
            Ok(PrintOutcome::Printed)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let classifier = match last_line(&stderr) {
                "" => format!("lp exited with {}", output.status),
                line => line.to_string(),
            };
            Ok(PrintOutcome::Failed(classifier))
        }
    }

    async fn close(&mut self) {
        self.document = None;
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(dir = %path.display(), error = %e, "Failed to remove job directory");
            }
        }
    }
}

fn last_line(text: &str) -> &str {
    text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

/// Format a micron length as millimetres without trailing zeros.
fn microns_to_mm(microns: f64) -> String {
    let mm = microns / 1000.0;
    if mm.fract() == 0.0 {
        format!("{}", mm as i64)
    } else {
        format!("{:.1}", mm)
    }
}

/// Translate engine options into `lp` arguments (without the file).
pub fn lp_args(options: &PrintOptions) -> Vec<String> {
    let mut args = Vec::new();
    let mut option = |value: String| {
        args.push("-o".to_string());
        args.push(value);
    };

    let mut head = Vec::new();
    if let Some(Value::String(device)) = options.get("deviceName")
        && !device.is_empty()
    {
        head.push("-d".to_string());
        head.push(device.clone());
    }
    if let Some(copies) = options.get("copies").and_then(Value::as_u64)
        && copies > 1
    {
        head.push("-n".to_string());
        head.push(copies.to_string());
    }

    if options.get("landscape").and_then(Value::as_bool) == Some(true) {
        option("landscape".to_string());
    }

    match options.get("pageSize") {
        Some(Value::String(name)) if !name.is_empty() => option(format!("media={}", name)),
        Some(Value::Object(size)) => {
            let width = size.get("width").and_then(Value::as_f64);
            let height = size.get("height").and_then(Value::as_f64);
            if let (Some(w), Some(h)) = (width, height) {
                option(format!(
                    "media=Custom.{}x{}mm",
                    microns_to_mm(w),
                    microns_to_mm(h)
                ));
            }
        }
        _ => {}
    }

    if let Some(Value::String(mode)) = options.get("duplexMode") {
        let sides = match mode.as_str() {
            "simplex" => Some("one-sided"),
            "shortEdge" => Some("two-sided-short-edge"),
            "longEdge" => Some("two-sided-long-edge"),
            _ => None,
        };
        if let Some(sides) = sides {
            option(format!("sides={}", sides));
        }
    }

    if options.get("color").and_then(Value::as_bool) == Some(false) {
        option("print-color-mode=monochrome".to_string());
    }

    if let Some(scale) = options.get("scaleFactor").and_then(Value::as_u64)
        && scale != 100
        && scale > 0
    {
        option(format!("scaling={}", scale));
    }

    if let Some(Value::Array(ranges)) = options.get("pageRanges") {
        let ranges: Vec<String> = ranges
            .iter()
            .filter_map(|r| {
                let from = r.get("from")?.as_u64()?;
                let to = r.get("to").and_then(Value::as_u64).unwrap_or(from);
                Some(if from == to {
                    format!("{}", from + 1)
                } else {
                    format!("{}-{}", from + 1, to + 1)
                })
            })
            .collect();
        if !ranges.is_empty() {
            option(format!("page-ranges={}", ranges.join(",")));
        }
    }

    head.extend(args);
    head
}

/// Parse `lpstat -p -d -v` output (C locale).
///
/// ```text
/// printer Kitchen is idle.  enabled since Tue 01 Oct 2024
/// printer Office now printing Office-12.  enabled since ...
/// printer Label disabled since Mon 30 Sep 2024 -
/// system default destination: Office
/// ```
pub fn parse_lpstat(output: &str) -> Vec<PrinterInfo> {
    let mut printers = Vec::new();
    let mut default_name = None;
    let mut devices = Vec::new();

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("printer ") {
            let mut words = rest.split_whitespace();
            let Some(name) = words.next() else { continue };
            let status = if rest.contains("disabled") {
                "disabled"
            } else if rest.contains("now printing") {
                "printing"
            } else {
                "idle"
            };
            let mut printer = PrinterInfo::new(name);
            printer.status = status.to_string();
            printers.push(printer);
        } else if let Some(name) = line.strip_prefix("system default destination:") {
            default_name = Some(name.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("device for ")
            && let Some((name, uri)) = rest.split_once(": ")
        {
            devices.push((name.to_string(), uri.trim().to_string()));
        }
    }

    for (name, uri) in devices {
        if let Some(printer) = printers.iter_mut().find(|p| p.name == name) {
            printer.options.insert("device-uri".to_string(), uri);
        }
    }

    if let Some(default_name) = default_name {
        for printer in &mut printers {
            printer.is_default = printer.name == default_name;
        }
    }
    printers
}
