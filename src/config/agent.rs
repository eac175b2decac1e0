//! Agent-side persisted configuration.
//!
//! Stored as pretty-printed JSON:
//!
//! ```json
//! {
//!   "port": 3000,
//!   "listenIP": "0.0.0.0",
//!   "websocket": {
//!     "enabled": true,
//!     "host": "wss://reverb.example.com",
//!     "channel": "printing",
//!     "auth": {}
//!   }
//! }
//! ```
//!
//! Keys missing from the file take their defaults. Saving merges a patch
//! over the current values; the running agent keeps its old settings until
//! restart.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PrintError, Result};

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "PRINTBRIDGE_CONFIG";

/// Reply for a successful save.
pub const SAVED_MESSAGE: &str = "Configuration saved. Please restart the app.";

/// Print agent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// HTTP intake port
    pub port: u16,
    /// Interface the intake server binds to
    #[serde(rename = "listenIP")]
    pub listen_ip: String,
    /// Printer used when a job names none; `None` means the OS default
    pub default_printer: Option<String>,
    /// Surfaces allowed to exist at once; extra jobs wait for a slot
    pub max_concurrent_jobs: usize,
    /// Request body limit of the intake server, in megabytes
    pub max_payload_mb: usize,
    pub engine: EngineConfig,
    pub websocket: WebSocketConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            listen_ip: "0.0.0.0".to_string(),
            default_printer: None,
            max_concurrent_jobs: 4,
            max_payload_mb: 50,
            engine: EngineConfig::default(),
            websocket: WebSocketConfig::default(),
        }
    }
}

/// Which rendering engine backs the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    /// Headless Chromium for rendering, CUPS (`lp`/`lpstat`) for printing
    Chromium,
    /// Accept every job without touching a printer
    DryRun,
}

/// Rendering engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Chromium/Chrome executable
    pub chromium_path: String,
    /// CUPS submit command
    pub lp_path: String,
    /// CUPS status command
    pub lpstat_path: String,
    /// Upper bound on waiting for a page to finish loading
    pub load_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Chromium,
            chromium_path: "chromium".to_string(),
            lp_path: "lp".to_string(),
            lpstat_path: "lpstat".to_string(),
            load_timeout_ms: 30_000,
        }
    }
}

/// Explicit push driver choice; `Auto` applies the host heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverSetting {
    #[default]
    Auto,
    Pusher,
    #[serde(alias = "socket.io")]
    Socketio,
    Polling,
}

/// Push channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebSocketConfig {
    pub enabled: bool,
    /// Hub address, e.g. `wss://reverb.example.com:443` or `https://io.example.com/socket.io`
    pub host: String,
    pub driver: DriverSetting,
    pub channel: String,
    /// Pusher application key
    pub key: Option<String>,
    pub cluster: String,
    /// Socket.IO endpoint path
    pub path: String,
    /// Opaque blob sent with the Socket.IO subscribe message
    pub auth: Value,
    pub use_polling: bool,
    pub polling_url: Option<String>,
    /// Milliseconds between polls
    pub polling_interval: u64,
    /// Where push-path results are POSTed, if anywhere
    pub callback_url: Option<String>,
    pub reconnect_delay_ms: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "http://localhost:6001".to_string(),
            driver: DriverSetting::Auto,
            channel: "printing".to_string(),
            key: None,
            cluster: "mt1".to_string(),
            path: "/socket.io".to_string(),
            auth: Value::Object(Default::default()),
            use_polling: false,
            polling_url: None,
            polling_interval: 2000,
            callback_url: None,
            reconnect_delay_ms: 5000,
        }
    }
}

impl AgentConfig {
    /// Address for the intake listener, e.g. `0.0.0.0:3000`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_ip, self.port)
    }

    /// Default location of the config file.
    ///
    /// `$PRINTBRIDGE_CONFIG`, else `$XDG_CONFIG_HOME/printbridge/config.json`,
    /// else `$HOME/.config/printbridge/config.json`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("printbridge").join("config.json")
    }

    /// Load the config file, falling back to defaults.
    ///
    /// A missing file is normal on first start. An unreadable or malformed
    /// file is logged and ignored so the agent still comes up.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Error loading config");
                Self::default()
            }
        }
    }

    /// Strict variant of [`load`](Self::load): `Ok(None)` when the file does not exist.
    pub fn try_load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Merge `patch` (a JSON object) over this config.
    ///
    /// Top-level keys of the patch replace the current ones wholesale.
    pub fn merged(&self, patch: &Value) -> Result<Self> {
        let patch = patch.as_object().ok_or_else(|| {
            PrintError::Configuration("config patch must be a JSON object".to_string())
        })?;
        let mut current = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            other => {
                return Err(PrintError::Configuration(format!(
                    "unexpected configuration shape: {}",
                    other
                )));
            }
        };
        for (key, value) in patch {
            current.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(current))
            .map_err(|e| PrintError::Configuration(format!("invalid configuration: {}", e)))
    }

    /// Merge `patch` over the current config and persist it to `path`.
    pub fn save(&self, path: &Path, patch: &Value) -> Result<Self> {
        let updated = self.merged(patch)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&updated)?)?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(updated)
    }
}
