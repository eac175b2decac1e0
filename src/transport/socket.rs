//! WebSocket session loop shared by the Pusher and Socket.IO drivers.
//!
//! A [`Protocol`] turns incoming text frames into [`Step`]s; the loop owns
//! the socket, the reconnect delay and the connection state.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{ConnectionState, DriverEvent, StateCell, stopped};
use crate::job::JobPayload;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What a protocol wants done after reading a frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    /// Send a text frame back.
    Reply(String),
    /// Handshake complete.
    Connected,
    Job(JobPayload),
    /// The server ended the session.
    Close(String),
}

/// Wire protocol spoken over the socket.
pub(crate) trait Protocol: Send + 'static {
    fn name(&self) -> &'static str;

    fn url(&self) -> String;

    fn on_text(&mut self, text: &str) -> Vec<Step>;
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    Dropped,
}

/// Connect, run sessions and reconnect until `stop` is raised.
pub(crate) async fn run<P: Protocol>(
    mut protocol: P,
    reconnect_delay: Duration,
    state: StateCell,
    events: mpsc::Sender<DriverEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let url = protocol.url();

    loop {
        transition(&state, &events, ConnectionState::Connecting).await;
        tracing::info!(%url, driver = protocol.name(), "Connecting to broadcast server");

        let connected = tokio::select! {
            _ = stopped(&mut stop) => break,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((socket, _response)) => {
                let end = session(&mut protocol, socket, &state, &events, &mut stop).await;
                if end == SessionEnd::Stopped {
                    break;
                }
                transition(&state, &events, ConnectionState::Connecting).await;
                tracing::warn!(
                    delay_ms = reconnect_delay.as_millis() as u64,
                    "Broadcast connection lost, reconnecting"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Broadcast connection failed");
            }
        }

        tokio::select! {
            _ = stopped(&mut stop) => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    transition(&state, &events, ConnectionState::Disconnected).await;
}

/// Move to `next`, announcing entry to and exit from `Connected`.
async fn transition(state: &StateCell, events: &mpsc::Sender<DriverEvent>, next: ConnectionState) {
    let previous = state.set(next);
    if previous == next {
        return;
    }
    if next == ConnectionState::Connected {
        tracing::info!("Broadcast connection established");
        let _ = events.send(DriverEvent::Connected).await;
    } else if previous == ConnectionState::Connected {
        tracing::info!("Broadcast connection closed");
        let _ = events.send(DriverEvent::Disconnected).await;
    }
}

async fn session<P: Protocol>(
    protocol: &mut P,
    socket: Socket,
    state: &StateCell,
    events: &mpsc::Sender<DriverEvent>,
    stop: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = stopped(stop) => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Stopped;
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        for step in protocol.on_text(&text) {
                            match step {
                                Step::Reply(frame) => {
                                    if let Err(e) = sink.send(Message::Text(frame)).await {
                                        tracing::error!(error = %e, "Failed to write to broadcast server");
                                        return SessionEnd::Dropped;
                                    }
                                }
                                Step::Connected => {
                                    transition(state, events, ConnectionState::Connected).await;
                                }
                                Step::Job(payload) => {
                                    tracing::info!(job_id = ?payload.job_id, "Print job received");
                                    if events.send(DriverEvent::PrintJob(payload)).await.is_err() {
                                        // Nobody is listening any more.
                                        return SessionEnd::Stopped;
                                    }
                                }
                                Step::Close(reason) => {
                                    tracing::warn!(%reason, "Broadcast server ended the session");
                                    return SessionEnd::Dropped;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Broadcast server closed WebSocket");
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong frames are answered by tungstenite.
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket receive error");
                        return SessionEnd::Dropped;
                    }
                    None => {
                        tracing::info!("WebSocket stream exhausted");
                        return SessionEnd::Dropped;
                    }
                }
            }
        }
    }
}

/// Map an `http(s)`/`ws(s)` scheme to the WebSocket one.
pub(crate) fn ws_scheme(scheme: &str) -> &'static str {
    match scheme {
        "https" | "wss" => "wss",
        _ => "ws",
    }
}
