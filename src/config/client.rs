//! Caller-side configuration for [`PrintClient`](crate::client::PrintClient).
//!
//! ## Environment
//!
//! | Variable | Default | Field |
//! |----------|---------|-------|
//! | `PRINT_SERVICE_ENABLED` | `true` | [`enabled`](ClientConfig::enabled) |
//! | `PRINT_SERVICE_URL` | `http://localhost:3000` | [`service_url`](ClientConfig::service_url) |
//! | `PRINT_SERVICE_TIMEOUT` | `30` | [`timeout_secs`](ClientConfig::timeout_secs) |
//! | `PRINT_MAX_PAYLOAD_SIZE` | `50` | [`max_payload_size_mb`](ClientConfig::max_payload_size_mb) |
//! | `PRINT_USE_WEBSOCKET` | `false` | [`use_websocket`](ClientConfig::use_websocket) |
//! | `PRINT_BROADCAST_CHANNEL` | `printing` | [`broadcast_channel`](ClientConfig::broadcast_channel) |
//! | `PRINT_DEFAULT_PRINTER` | unset | [`default_printer`](ClientConfig::default_printer) |
//! | `PRINT_RETRY_ENABLED` | `true` | [`RetryConfig::enabled`] |
//! | `PRINT_RETRY_MAX_ATTEMPTS` | `3` | [`RetryConfig::max_attempts`] |
//! | `PRINT_RETRY_DELAY` | `5` | [`RetryConfig::delay_secs`] |
//! | `PRINT_LOGGING_ENABLED` | `true` | [`LoggingConfig::enabled`] |
//! | `PRINT_LOG_CHANNEL` | `daily` | [`LoggingConfig::channel`] |
//!
//! `default_options` and `profiles` are not read from the environment; the
//! built-in values below apply unless the caller replaces them.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::job::PrintOptions;

/// Settings for talking to a print agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Master switch; when off every operation short-circuits
    pub enabled: bool,
    pub service_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Largest request body the client will send, in megabytes
    pub max_payload_size_mb: u64,
    /// Jobs are broadcast instead of posted (consumed by the broadcasting side)
    pub use_websocket: bool,
    pub broadcast_channel: String,
    pub default_printer: Option<String>,
    pub default_options: PrintOptions,
    pub profiles: BTreeMap<String, PrintOptions>,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

/// Retry policy for transport failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause between attempts, in seconds
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            delay_secs: 5,
        }
    }
}

impl RetryConfig {
    /// Attempts actually made per request.
    pub fn attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// Recorded on every log event as the `channel` field
    pub channel: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: "daily".to_string(),
        }
    }
}

fn options(value: serde_json::Value) -> PrintOptions {
    match value {
        serde_json::Value::Object(map) => map,
        _ => PrintOptions::new(),
    }
}

/// Options applied to every job before the caller's own.
pub fn default_options() -> PrintOptions {
    options(json!({
        "silent": true,
        "printBackground": true,
        "pageSize": "A4",
        "marginsType": 0,
    }))
}

/// Built-in named presets. Page sizes in microns.
pub fn builtin_profiles() -> BTreeMap<String, PrintOptions> {
    let mut profiles = BTreeMap::new();
    profiles.insert(
        "thermal_80mm".to_string(),
        options(json!({
            "pageSize": {"width": 80000, "height": 297000},
            "marginsType": 1,
            "printBackground": true,
            "preferCSSPageSize": true,
            "scaleFactor": 100,
        })),
    );
    profiles.insert(
        "thermal_58mm".to_string(),
        options(json!({
            "pageSize": {"width": 58000, "height": 297000},
            "marginsType": 1,
            "printBackground": true,
            "preferCSSPageSize": true,
            "scaleFactor": 100,
        })),
    );
    profiles.insert(
        "a4".to_string(),
        options(json!({
            "pageSize": "A4",
            "marginsType": 0,
            "printBackground": true,
            "landscape": false,
        })),
    );
    profiles.insert(
        "a4_landscape".to_string(),
        options(json!({
            "pageSize": "A4",
            "marginsType": 0,
            "printBackground": true,
            "landscape": true,
        })),
    );
    profiles.insert(
        "letter".to_string(),
        options(json!({
            "pageSize": "Letter",
            "marginsType": 0,
            "printBackground": true,
        })),
    );
    profiles.insert(
        "label".to_string(),
        options(json!({
            "pageSize": {"width": 100000, "height": 50000},
            "marginsType": 1,
            "printBackground": true,
        })),
    );
    profiles
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_url: "http://localhost:3000".to_string(),
            timeout_secs: 30,
            max_payload_size_mb: 50,
            use_websocket: false,
            broadcast_channel: "printing".to_string(),
            default_printer: None,
            default_options: default_options(),
            profiles: builtin_profiles(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Laravel-style boolean parsing for environment values.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "(true)" | "1" | "on" | "yes" => Some(true),
        "false" | "(false)" | "0" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

impl ClientConfig {
    /// Read settings from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to honour a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup; unparsable values keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let flag = |key: &str, default: bool| lookup(key).and_then(|v| parse_bool(&v)).unwrap_or(default);
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        config.enabled = flag("PRINT_SERVICE_ENABLED", config.enabled);
        if let Some(url) = lookup("PRINT_SERVICE_URL").filter(|u| !u.trim().is_empty()) {
            config.service_url = url.trim().to_string();
        }
        config.timeout_secs = number("PRINT_SERVICE_TIMEOUT", config.timeout_secs);
        config.max_payload_size_mb = number("PRINT_MAX_PAYLOAD_SIZE", config.max_payload_size_mb);
        config.use_websocket = flag("PRINT_USE_WEBSOCKET", config.use_websocket);
        if let Some(channel) = lookup("PRINT_BROADCAST_CHANNEL").filter(|c| !c.is_empty()) {
            config.broadcast_channel = channel;
        }
        config.default_printer = lookup("PRINT_DEFAULT_PRINTER").filter(|p| !p.is_empty());

        config.retry.enabled = flag("PRINT_RETRY_ENABLED", config.retry.enabled);
        config.retry.max_attempts =
            number("PRINT_RETRY_MAX_ATTEMPTS", config.retry.max_attempts as u64) as u32;
        config.retry.delay_secs = number("PRINT_RETRY_DELAY", config.retry.delay_secs);

        config.logging.enabled = flag("PRINT_LOGGING_ENABLED", config.logging.enabled);
        if let Some(channel) = lookup("PRINT_LOG_CHANNEL").filter(|c| !c.is_empty()) {
            config.logging.channel = channel;
        }

        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Largest body in bytes; zero disables the check.
    pub fn max_payload_bytes(&self) -> u64 {
        self.max_payload_size_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.enabled);
        assert_eq!(config.service_url, "http://localhost:3000");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.default_options["pageSize"], "A4");
        assert_eq!(config.profiles.len(), 6);
        assert_eq!(config.profiles["thermal_58mm"]["pageSize"]["width"], 58000);
        assert_eq!(config.profiles["a4_landscape"]["landscape"], true);
    }

    #[test]
    fn test_from_lookup_reads_original_variables() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("PRINT_SERVICE_ENABLED", "false"),
            ("PRINT_SERVICE_URL", "http://192.168.1.100:3000"),
            ("PRINT_SERVICE_TIMEOUT", "10"),
            ("PRINT_DEFAULT_PRINTER", "Kitchen"),
            ("PRINT_RETRY_MAX_ATTEMPTS", "5"),
            ("PRINT_LOG_CHANNEL", "stack"),
        ]));

        assert!(!config.enabled);
        assert_eq!(config.service_url, "http://192.168.1.100:3000");
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.default_printer.as_deref(), Some("Kitchen"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.logging.channel, "stack");
    }

    #[test]
    fn test_unparsable_values_keep_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("PRINT_SERVICE_TIMEOUT", "soon"),
            ("PRINT_SERVICE_ENABLED", "maybe"),
        ]));
        assert_eq!(config.timeout_secs, 30);
        assert!(config.enabled);
    }

    #[test]
    fn test_empty_default_printer_is_none() {
        let config = ClientConfig::from_lookup(lookup_from(&[("PRINT_DEFAULT_PRINTER", "")]));
        assert_eq!(config.default_printer, None);
    }

    #[test]
    fn test_retry_attempts() {
        let mut retry = RetryConfig::default();
        assert_eq!(retry.attempts(), 3);
        retry.enabled = false;
        assert_eq!(retry.attempts(), 1);
        retry.enabled = true;
        retry.max_attempts = 0;
        assert_eq!(retry.attempts(), 1);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("(false)"), Some(false));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("maybe"), None);
    }
}
