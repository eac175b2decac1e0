//! Pusher protocol driver (Laravel Reverb, Laravel WebSockets, Soketi).
//!
//! Speaks protocol version 7 over a plain WebSocket and subscribes to one
//! public channel.
//!
//! ```text
//! server: {"event":"pusher:connection_established","data":"{\"socket_id\":..}"}
//! client: {"event":"pusher:subscribe","data":{"channel":"printing"}}
//! server: {"event":"print.job","channel":"printing","data":"{\"jobId\":..}"}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::socket::{self, Protocol, Step, ws_scheme};
use super::{ConnectionState, Driver, DriverEvent, DriverKind, PRINT_JOB_EVENT, Session, StateCell};
use crate::config::WebSocketConfig;
use crate::error::Result;
use crate::job::JobPayload;

const PROTOCOL_VERSION: u8 = 7;
const DEFAULT_PORT: u16 = 6001;
const DEFAULT_KEY: &str = "local";

/// Build the Pusher socket URL for `config`.
///
/// An unparsable host falls back to `ws://localhost:6001`. An empty host
/// targets the hosted Pusher cluster.
pub fn socket_url(config: &WebSocketConfig) -> String {
    let key = config.key.as_deref().filter(|k| !k.is_empty()).unwrap_or(DEFAULT_KEY);
    let query = format!(
        "protocol={}&client=printbridge&version={}",
        PROTOCOL_VERSION,
        env!("CARGO_PKG_VERSION")
    );

    if config.host.trim().is_empty() {
        return format!("wss://ws-{}.pusher.com:443/app/{}?{}", config.cluster, key, query);
    }

    let (scheme, host, port) = match Url::parse(&config.host) {
        Ok(url) if url.host_str().is_some() => (
            ws_scheme(url.scheme()),
            url.host_str().unwrap_or("localhost").to_string(),
            url.port().unwrap_or(DEFAULT_PORT),
        ),
        _ => {
            tracing::warn!(host = %config.host, "Invalid broadcast host, using localhost");
            ("ws", "localhost".to_string(), DEFAULT_PORT)
        }
    };

    format!("{}://{}:{}/app/{}?{}", scheme, host, port, key, query)
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Frame handling for one channel subscription.
pub(crate) struct PusherProtocol {
    url: String,
    channel: String,
}

impl PusherProtocol {
    pub(crate) fn new(config: &WebSocketConfig) -> Self {
        Self {
            url: socket_url(config),
            channel: config.channel.clone(),
        }
    }

    fn subscribe(&self) -> String {
        json!({
            "event": "pusher:subscribe",
            "data": { "channel": self.channel },
        })
        .to_string()
    }
}

/// Pusher sends `data` as a JSON-encoded string; some servers send an object.
fn decode_data(data: Value) -> Value {
    match data {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    }
}

impl Protocol for PusherProtocol {
    fn name(&self) -> &'static str {
        "pusher"
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn on_text(&mut self, text: &str) -> Vec<Step> {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, raw = %text, "Malformed Pusher frame");
                return Vec::new();
            }
        };

        match envelope.event.as_str() {
            "pusher:connection_established" => vec![Step::Connected, Step::Reply(self.subscribe())],
            "pusher_internal:subscription_succeeded" => {
                tracing::info!(channel = %self.channel, "Subscribed to channel");
                Vec::new()
            }
            "pusher:ping" => vec![Step::Reply(json!({"event": "pusher:pong", "data": {}}).to_string())],
            "pusher:error" => {
                tracing::warn!(data = %envelope.data, "Pusher error");
                Vec::new()
            }
            event if event.trim_start_matches('.') == PRINT_JOB_EVENT => {
                if let Some(channel) = &envelope.channel
                    && channel != &self.channel
                {
                    return Vec::new();
                }
                vec![Step::Job(JobPayload::from_value(decode_data(envelope.data)))]
            }
            _ => Vec::new(),
        }
    }
}

/// Push driver for Pusher-compatible servers.
pub struct PusherDriver {
    config: WebSocketConfig,
    state: StateCell,
    session: Option<Session>,
}

impl PusherDriver {
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            state: StateCell::new(),
            session: None,
        }
    }
}

#[async_trait]
impl Driver for PusherDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::PubSub
    }

    async fn connect(&mut self, events: mpsc::Sender<DriverEvent>) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let protocol = PusherProtocol::new(&self.config);
        let delay = Duration::from_millis(self.config.reconnect_delay_ms);
        let state = self.state.clone();

        self.session = Some(Session::spawn(move |stop| {
            socket::run(protocol, delay, state, events, stop)
        }));
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop().await;
        }
        self.state.set(ConnectionState::Disconnected);
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(host: &str) -> WebSocketConfig {
        WebSocketConfig {
            host: host.to_string(),
            ..Default::default()
        }
    }

    fn protocol() -> PusherProtocol {
        PusherProtocol::new(&config("http://localhost:6001"))
    }

    #[test]
    fn test_socket_url_defaults() {
        let url = socket_url(&config("http://localhost"));
        assert!(url.starts_with("ws://localhost:6001/app/local?protocol=7&client=printbridge"));
    }

    #[test]
    fn test_socket_url_tls_and_key() {
        let mut cfg = config("https://reverb.example.com:8443");
        cfg.key = Some("app-key".into());
        let url = socket_url(&cfg);
        assert!(url.starts_with("wss://reverb.example.com:8443/app/app-key?"));

        let url = socket_url(&config("wss://reverb.example.com"));
        assert!(url.starts_with("wss://reverb.example.com:6001/"));
    }

    #[test]
    fn test_socket_url_invalid_host_falls_back() {
        let url = socket_url(&config("not a url"));
        assert!(url.starts_with("ws://localhost:6001/app/local?"));
    }

    #[test]
    fn test_socket_url_empty_host_uses_cluster() {
        let mut cfg = config("");
        cfg.cluster = "eu".into();
        assert!(socket_url(&cfg).starts_with("wss://ws-eu.pusher.com:443/app/local?"));
    }

    #[test]
    fn test_connection_established_subscribes() {
        let steps = protocol().on_text(
            r#"{"event":"pusher:connection_established","data":"{\"socket_id\":\"1.2\",\"activity_timeout\":120}"}"#,
        );

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0], Step::Connected);
        let Step::Reply(frame) = &steps[1] else {
            panic!("expected subscribe frame");
        };
        let frame: Value = serde_json::from_str(frame).unwrap();
        assert_eq!(frame["event"], "pusher:subscribe");
        assert_eq!(frame["data"]["channel"], "printing");
    }

    #[test]
    fn test_ping_answered_with_pong() {
        let steps = protocol().on_text(r#"{"event":"pusher:ping","data":{}}"#);
        let [Step::Reply(frame)] = steps.as_slice() else {
            panic!("expected pong");
        };
        assert!(frame.contains("pusher:pong"));
    }

    #[test]
    fn test_print_job_with_string_data() {
        let steps = protocol().on_text(
            r#"{"event":"print.job","channel":"printing","data":"{\"jobId\":\"print_1\",\"html\":\"<p>hi</p>\"}"}"#,
        );

        let [Step::Job(job)] = steps.as_slice() else {
            panic!("expected a job, got {:?}", steps);
        };
        assert_eq!(job.job_id.as_deref(), Some("print_1"));
        assert_eq!(job.html.as_deref(), Some("<p>hi</p>"));
    }

    #[test]
    fn test_print_job_with_object_data() {
        let steps = protocol()
            .on_text(r#"{"event":".print.job","channel":"printing","data":{"jobId":"print_2"}}"#);

        let [Step::Job(job)] = steps.as_slice() else {
            panic!("expected a job");
        };
        assert_eq!(job.job_id.as_deref(), Some("print_2"));
    }

    #[test]
    fn test_print_job_on_other_channel_ignored() {
        let steps = protocol()
            .on_text(r#"{"event":"print.job","channel":"other","data":{"jobId":"x"}}"#);
        assert!(steps.is_empty());
    }

    #[test]
    fn test_unknown_and_malformed_frames_ignored() {
        let mut p = protocol();
        assert!(p.on_text(r#"{"event":"something.else","data":{}}"#).is_empty());
        assert!(p.on_text("not json").is_empty());
    }

    #[tokio::test]
    async fn test_connect_twice_keeps_one_session() {
        let mut driver = PusherDriver::new(config("http://127.0.0.1:9"));
        let (tx, _rx) = mpsc::channel(4);

        driver.connect(tx.clone()).await.unwrap();
        driver.connect(tx).await.unwrap();
        assert_eq!(driver.kind(), DriverKind::PubSub);

        driver.disconnect().await;
        assert_eq!(driver.state(), ConnectionState::Disconnected);
    }
}
