//! Socket.IO v4 driver (Engine.IO protocol 4, WebSocket transport only).
//!
//! Packets are text frames whose first character is the Engine.IO type and,
//! for messages, the second is the Socket.IO type:
//!
//! | Frame | Meaning |
//! |-------|---------|
//! | `0{..}` | Engine.IO open |
//! | `1` | Engine.IO close |
//! | `2` / `3` | ping / pong |
//! | `40` | namespace connected |
//! | `41` | namespace disconnected |
//! | `42[..]` | event |
//! | `44{..}` | connect error |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::socket::{self, Protocol, Step, ws_scheme};
use super::{ConnectionState, Driver, DriverEvent, DriverKind, PRINT_JOB_EVENT, Session, StateCell};
use crate::config::WebSocketConfig;
use crate::error::Result;
use crate::job::JobPayload;

/// Build the Engine.IO WebSocket URL for `config`.
///
/// Only the origin of `host` is used; `path` selects the server endpoint.
pub fn socket_url(config: &WebSocketConfig) -> String {
    let origin = match Url::parse(&config.host) {
        Ok(url) if url.host_str().is_some() => {
            let host = url.host_str().unwrap_or("localhost");
            match url.port() {
                Some(port) => format!("{}://{}:{}", ws_scheme(url.scheme()), host, port),
                None => format!("{}://{}", ws_scheme(url.scheme()), host),
            }
        }
        _ => {
            tracing::warn!(host = %config.host, "Invalid Socket.IO host, using localhost");
            "ws://localhost:6001".to_string()
        }
    };

    let path = config.path.trim_matches('/');
    let path = if path.is_empty() { "socket.io" } else { path };

    format!("{}/{}/?EIO=4&transport=websocket", origin, path)
}

/// Frame handling for one channel subscription.
pub(crate) struct SocketIoProtocol {
    url: String,
    channel: String,
    auth: Value,
}

impl SocketIoProtocol {
    pub(crate) fn new(config: &WebSocketConfig) -> Self {
        Self {
            url: socket_url(config),
            channel: config.channel.clone(),
            auth: config.auth.clone(),
        }
    }

    fn subscribe(&self) -> String {
        let auth = if self.auth.is_null() { json!({}) } else { self.auth.clone() };
        format!(
            "42{}",
            json!(["subscribe", { "channel": self.channel, "auth": auth }])
        )
    }

    fn on_event(&self, body: &str) -> Vec<Step> {
        // An acknowledgement id may sit between the type and the payload.
        let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
        let args: Vec<Value> = match serde_json::from_str(body) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(error = %e, raw = %body, "Malformed Socket.IO event");
                return Vec::new();
            }
        };

        match args.as_slice() {
            [Value::String(name), data, ..] if name == PRINT_JOB_EVENT => {
                vec![Step::Job(JobPayload::from_value(data.clone()))]
            }
            [Value::String(name), ..] => {
                tracing::debug!(event = %name, "Ignoring Socket.IO event");
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

impl Protocol for SocketIoProtocol {
    fn name(&self) -> &'static str {
        "socketio"
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn on_text(&mut self, text: &str) -> Vec<Step> {
        let mut chars = text.chars();
        match chars.next() {
            Some('0') => vec![Step::Reply("40".to_string())],
            Some('1') => vec![Step::Close("engine closed".to_string())],
            Some('2') => vec![Step::Reply("3".to_string())],
            Some('4') => match chars.next() {
                Some('0') => vec![Step::Connected, Step::Reply(self.subscribe())],
                Some('1') => vec![Step::Close("namespace disconnected".to_string())],
                Some('2') => self.on_event(&text[2..]),
                Some('4') => vec![Step::Close(format!("connect error: {}", &text[2..]))],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

/// Push driver for Socket.IO servers.
pub struct SocketIoDriver {
    config: WebSocketConfig,
    state: StateCell,
    session: Option<Session>,
}

impl SocketIoDriver {
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            state: StateCell::new(),
            session: None,
        }
    }
}

#[async_trait]
impl Driver for SocketIoDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Socket
    }

    async fn connect(&mut self, events: mpsc::Sender<DriverEvent>) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let protocol = SocketIoProtocol::new(&self.config);
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
