//! HTTP polling driver.
//!
//! For hosts where no broadcast server is available: every
//! `pollingInterval` milliseconds the agent asks the application for queued
//! jobs.
//!
//! ```text
//! GET <pollingUrl>?channel=printing
//! 200 {"jobs":[{"jobId":"a","html":"..."},{"jobId":"b","url":"..."}]}
//! ```
//!
//! Jobs are dispatched in array order. A failed poll is logged and the next
//! tick polls again.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::{ConnectionState, Driver, DriverEvent, DriverKind, Session, StateCell, stopped};
use crate::config::WebSocketConfig;
use crate::error::{PrintError, Result};
use crate::job::JobPayload;

/// Per-request timeout for a poll.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Deserialize)]
struct PollResponse {
    #[serde(default)]
    jobs: Vec<Value>,
}

/// Fetch the queued jobs for `channel` once.
pub async fn poll_once(http: &reqwest::Client, url: &str, channel: &str) -> Result<Vec<JobPayload>> {
    let response = http
        .get(url)
        .query(&[("channel", channel)])
        .timeout(POLL_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;

    let body: PollResponse = response.json().await?;
    Ok(body.jobs.into_iter().map(JobPayload::from_value).collect())
}

/// Push driver that polls an HTTP endpoint on a timer.
pub struct PollingDriver {
    config: WebSocketConfig,
    http: reqwest::Client,
    state: StateCell,
    session: Option<Session>,
}

impl PollingDriver {
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            state: StateCell::new(),
            session: None,
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.config.polling_interval.max(1))
    }
}

#[async_trait]
impl Driver for PollingDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Polling
    }

    async fn connect(&mut self, events: mpsc::Sender<DriverEvent>) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let url = match self.config.polling_url.as_deref() {
            Some(url) if !url.trim().is_empty() => url.to_string(),
            _ => {
                return Err(PrintError::Configuration(
                    "Polling URL is not configured".to_string(),
                ));
            }
        };

        let interval = self.interval();
        tracing::info!(%url, interval_ms = interval.as_millis() as u64, "Polling for print jobs");

        self.state.set(ConnectionState::Connected);
        let _ = events.send(DriverEvent::Connected).await;

        let http = self.http.clone();
        let channel = self.config.channel.clone();
        self.session = Some(Session::spawn(move |mut stop| async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; the first poll waits a full interval.
            ticker.tick().await;

            'poll: loop {
                let polled = tokio::select! {
                    _ = stopped(&mut stop) => break,
                    _ = ticker.tick() => tokio::select! {
                        _ = stopped(&mut stop) => break,
                        polled = poll_once(&http, &url, &channel) => polled,
                    },
                };

                match polled {
                    Ok(jobs) => {
                        for job in jobs {
                            tracing::info!(job_id = ?job.job_id, "Print job received");
                            if events.send(DriverEvent::PrintJob(job)).await.is_err() {
                                break 'poll;
                            }
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Polling error"),
                }
            }

            let _ = events.send(DriverEvent::Disconnected).await;
        }));
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop().await;
            tracing::info!("Polling stopped");
        }
        self.state.set(ConnectionState::Disconnected);
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}
