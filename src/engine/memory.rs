//! In-memory engine.
//!
//! Nothing is rendered and nothing reaches a printer. Every surface
//! allocation, load and print call is recorded so callers can inspect what
//! the executor did. Backs the agent's `dry-run` engine.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{LoadState, PrintOutcome, PrinterInfo, RenderEngine, Surface};
use crate::error::{PrintError, Result};
use crate::job::{ContentKind, PrintOptions};

/// One recorded print call.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintCall {
    pub kind: ContentKind,
    /// Address the surface had loaded when print was invoked
    pub url: String,
    pub options: PrintOptions,
}

#[derive(Debug, Default)]
struct Recorder {
    opened: usize,
    closed: usize,
    loads: Vec<String>,
    prints: Vec<PrintCall>,
}

#[derive(Debug, Clone)]
struct Behavior {
    load_signal: bool,
    load_hangs: bool,
    load_error: Option<String>,
    print_error: Option<String>,
    print_failure: Option<String>,
    printers: Vec<PrinterInfo>,
}

/// Recording engine.
///
/// ```
/// use printbridge::engine::MemoryEngine;
///
/// let engine = MemoryEngine::new();
/// assert_eq!(engine.surfaces_opened(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    recorder: Arc<Mutex<Recorder>>,
    behavior: Behavior,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Engine that loads instantly, prints successfully and reports one
    /// default printer.
    pub fn new() -> Self {
        Self {
            recorder: Arc::new(Mutex::new(Recorder::default())),
            behavior: Behavior {
                load_signal: true,
                load_hangs: false,
                load_error: None,
                print_error: None,
                print_failure: None,
                printers: vec![PrinterInfo::new("Dry Run").default_printer()],
            },
        }
    }

    /// Loads report no completion signal, forcing the fixed settle delay.
    pub fn without_load_signal(mut self) -> Self {
        self.behavior.load_signal = false;
        self
    }

    /// Loads never complete.
    pub fn hanging_load(mut self) -> Self {
        self.behavior.load_hangs = true;
        self
    }

    /// Every load fails with `message`.
    pub fn failing_load(mut self, message: impl Into<String>) -> Self {
        self.behavior.load_error = Some(message.into());
        self
    }

    /// Every print call errors out with `message` before reaching the spooler.
    pub fn erroring_print(mut self, message: impl Into<String>) -> Self {
        self.behavior.print_error = Some(message.into());
        self
    }

    /// The spooler rejects every job with the given classifier.
    pub fn rejecting_print(mut self, classifier: impl Into<String>) -> Self {
        self.behavior.print_failure = Some(classifier.into());
        self
    }

    pub fn with_printers(mut self, printers: Vec<PrinterInfo>) -> Self {
        self.behavior.printers = printers;
        self
    }

    pub fn surfaces_opened(&self) -> usize {
        self.lock().opened
    }

    pub fn surfaces_closed(&self) -> usize {
        self.lock().closed
    }

    pub fn loads(&self) -> Vec<String> {
        self.lock().loads.clone()
    }

    pub fn print_calls(&self) -> Vec<PrintCall> {
        self.lock().prints.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorder> {
        // A poisoned recorder still holds valid counters.
        self.recorder.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RenderEngine for MemoryEngine {
    async fn open_surface(&self, kind: ContentKind) -> Result<Box<dyn Surface>> {
        self.lock().opened += 1;
        Ok(Box::new(MemorySurface {
            engine: self.clone(),
            kind,
            url: None,
            closed: false,
        }))
    }

    async fn printers(&self) -> Result<Vec<PrinterInfo>> {
        Ok(self.behavior.printers.clone())
    }
}

struct MemorySurface {
    engine: MemoryEngine,
    kind: ContentKind,
    url: Option<String>,
    closed: bool,
}

#[async_trait]
impl Surface for MemorySurface {
    async fn load(&mut self, url: &str) -> Result<LoadState> {
        self.engine.lock().loads.push(url.to_string());
        if self.engine.behavior.load_hangs {
            std::future::pending::<()>().await;
        }
        if let Some(message) = &self.engine.behavior.load_error {
            return Err(PrintError::Execution(message.clone()));
        }
        self.url = Some(url.to_string());
        Ok(if self.engine.behavior.load_signal {
            LoadState::Ready
        } else {
            LoadState::Unknown
        })
    }

    async fn print(&mut self, options: &PrintOptions) -> Result<PrintOutcome> {
        if let Some(message) = &self.engine.behavior.print_error {
            return Err(PrintError::Execution(message.clone()));
        }
        self.engine.lock().prints.push(PrintCall {
            kind: self.kind,
            url: self.url.clone().unwrap_or_default(),
            options: options.clone(),
        });
        Ok(match &self.engine.behavior.print_failure {
            Some(classifier) => PrintOutcome::Failed(classifier.clone()),
            None => PrintOutcome::Printed,
        })
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.engine.lock().closed += 1;
        }
    }
}
