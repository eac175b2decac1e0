//! # Push Transports
//!
//! Receive print jobs pushed from a server that cannot reach the agent's
//! HTTP port directly.
//!
//! ## Available Drivers
//!
//! - [`pusher`]: Pusher protocol over WebSocket (Laravel Reverb, Laravel
//!   WebSockets, Soketi, Pusher Channels)
//! - [`socketio`]: Socket.IO v4 over WebSocket
//! - [`polling`]: periodic HTTP GET against a job queue endpoint
//!
//! Every driver has the same lifecycle: [`Driver::connect`] starts a
//! background task that reports [`DriverEvent`]s on a channel,
//! [`Driver::disconnect`] stops it. Disconnecting a driver that never
//! connected is a no-op.
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──handshake──► Connected
//!      ▲                          ▲                         │
//!      │                          └──── reconnect delay ◄───┤ connection lost
//!      └──────────────────── disconnect() ──────────────────┘
//! ```
//!
//! The polling driver skips `Connecting`: it is connected from `connect()`
//! until `disconnect()`.

pub mod polling;
pub mod pusher;
pub mod report;
mod socket;
pub mod socketio;

pub use polling::PollingDriver;
pub use pusher::PusherDriver;
pub use report::Reporter;
pub use socketio::SocketIoDriver;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{DriverSetting, WebSocketConfig};
use crate::error::Result;
use crate::job::JobPayload;

/// Event name carrying print jobs on every transport.
pub const PRINT_JOB_EVENT: &str = "print.job";

/// How long `disconnect()` waits for a session to wind down.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Concrete transport strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    PubSub,
    Socket,
    Polling,
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DriverKind::PubSub => "pusher",
            DriverKind::Socket => "socketio",
            DriverKind::Polling => "polling",
        })
    }
}

/// Pick the driver for `config`.
///
/// An explicit `driver` setting always wins. With `auto`, a host mentioning
/// `socket.io` selects Socket.IO, then `usePolling` selects polling, and
/// everything else speaks the Pusher protocol.
pub fn select_driver(config: &WebSocketConfig) -> DriverKind {
    match config.driver {
        DriverSetting::Pusher => DriverKind::PubSub,
        DriverSetting::Socketio => DriverKind::Socket,
        DriverSetting::Polling => DriverKind::Polling,
        DriverSetting::Auto => {
            if config.host.to_lowercase().contains("socket.io") {
                DriverKind::Socket
            } else if config.use_polling {
                DriverKind::Polling
            } else {
                DriverKind::PubSub
            }
        }
    }
}

/// Build the driver selected by [`select_driver`].
pub fn build_driver(config: &WebSocketConfig) -> Box<dyn Driver> {
    match select_driver(config) {
        DriverKind::PubSub => Box::new(PusherDriver::new(config.clone())),
        DriverKind::Socket => Box::new(SocketIoDriver::new(config.clone())),
        DriverKind::Polling => Box::new(PollingDriver::new(config.clone())),
    }
}

/// Connection lifecycle of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What a running driver reports.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    Connected,
    Disconnected,
    PrintJob(JobPayload),
}

/// A push transport.
#[async_trait]
pub trait Driver: Send + Sync {
    fn kind(&self) -> DriverKind;

    /// Start receiving jobs. Events are sent on `events` until
    /// [`disconnect`](Self::disconnect) is called.
    ///
    /// Calling `connect` on a running driver does nothing.
    async fn connect(&mut self, events: mpsc::Sender<DriverEvent>) -> Result<()>;

    /// Stop receiving jobs. Idempotent.
    async fn disconnect(&mut self);

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

/// Shared, observable connection state.
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<watch::Sender<ConnectionState>>);

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self(Arc::new(tx))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.0.borrow()
    }

    /// Set the state and return the previous one.
    pub(crate) fn set(&self, state: ConnectionState) -> ConnectionState {
        self.0.send_replace(state)
    }
}

/// A running background task plus its stop signal.
pub(crate) struct Session {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Session {
    pub(crate) fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(stop_rx));
        Self { stop, task }
    }

    /// Signal the task and wait briefly for it; abort if it lingers.
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(true);
        let mut task = self.task;
        if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
            tracing::warn!("Transport task did not stop in time, aborting");
            task.abort();
        }
    }
}

/// Resolve once the stop flag is raised (or its sender is gone).
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(host: &str) -> WebSocketConfig {
        WebSocketConfig {
            host: host.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_auto_defaults_to_pusher() {
        assert_eq!(select_driver(&ws("wss://reverb.example.com")), DriverKind::PubSub);
    }

    #[test]
    fn test_auto_detects_socket_io_in_host() {
        assert_eq!(
            select_driver(&ws("https://io.example.com/Socket.IO")),
            DriverKind::Socket
        );
    }

    #[test]
    fn test_auto_polling_flag() {
        let mut config = ws("https://app.example.com");
        config.use_polling = true;
        assert_eq!(select_driver(&config), DriverKind::Polling);

        // The host heuristic is checked first.
        config.host = "https://app.example.com/socket.io".into();
        assert_eq!(select_driver(&config), DriverKind::Socket);
    }

    #[test]
    fn test_explicit_driver_wins() {
        let mut config = ws("https://io.example.com/socket.io");
        config.driver = DriverSetting::Pusher;
        assert_eq!(select_driver(&config), DriverKind::PubSub);
        config.driver = DriverSetting::Polling;
        assert_eq!(select_driver(&config), DriverKind::Polling);
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_noop() {
        let mut config = ws("http://localhost:6001");
        for setting in [DriverSetting::Pusher, DriverSetting::Socketio, DriverSetting::Polling] {
            config.driver = setting;
            let mut driver = build_driver(&config);

            driver.disconnect().await;
            driver.disconnect().await;

            assert!(!driver.is_connected());
            assert_eq!(driver.state(), ConnectionState::Disconnected);
        }
    }

    #[tokio::test]
    async fn test_session_stop_signal() {
        let session = Session::spawn(|mut stop| async move {
            stopped(&mut stop).await;
        });
        session.stop().await;
    }

    #[test]
    fn test_state_cell_returns_previous() {
        let cell = StateCell::new();
        assert_eq!(cell.set(ConnectionState::Connecting), ConnectionState::Disconnected);
        assert_eq!(cell.get(), ConnectionState::Connecting);
    }
}
