//! # Print Agent
//!
//! Ties the pieces together: one [`JobExecutor`] shared by the HTTP intake
//! server and, when `websocket.enabled` is set, a push driver.
//!
//! ```text
//!  HTTP /print* ──► handlers ──┐
//!                              ├──► JobExecutor ──► RenderEngine
//!  push driver ──► dispatch ───┘          │
//!                     └──── Reporter ◄────┘ (log + optional callback)
//! ```
//!
//! Startup order: bind the port (fatal if taken), connect the driver, then
//! serve until shutdown. On shutdown the driver is disconnected and pushed
//! jobs already in flight run to completion.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::{AgentConfig, EngineKind};
use crate::engine::{ChromiumEngine, MemoryEngine, RenderEngine};
use crate::error::Result;
use crate::executor::{ExecutorConfig, JobExecutor};
use crate::server::{self, AppState, ServerConfig};
use crate::transport::{self, DriverEvent, Reporter};

/// Driver events buffered before the driver waits on the dispatcher.
const EVENT_BUFFER: usize = 64;

pub struct Agent {
    config: AgentConfig,
    executor: Arc<JobExecutor>,
}

impl Agent {
    /// Create an agent with the engine named in `config.engine`.
    pub fn new(config: AgentConfig) -> Self {
        let engine: Arc<dyn RenderEngine> = match config.engine.kind {
            EngineKind::Chromium => Arc::new(ChromiumEngine::new(config.engine.clone())),
            EngineKind::DryRun => Arc::new(MemoryEngine::new()),
        };
        Self::with_engine(config, engine)
    }

    pub fn with_engine(config: AgentConfig, engine: Arc<dyn RenderEngine>) -> Self {
        let executor = Arc::new(JobExecutor::new(engine, ExecutorConfig::from(&config)));
        Self { config, executor }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn executor(&self) -> Arc<JobExecutor> {
        Arc::clone(&self.executor)
    }

    /// Run until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let server_config = ServerConfig::from(&self.config);
        let listener = server::bind(&server_config).await?;
        let state = Arc::new(AppState::new(server_config, self.executor()));

        let mut push = None;
        if self.config.websocket.enabled {
            let mut driver = transport::build_driver(&self.config.websocket);
            tracing::info!(driver = %driver.kind(), channel = %self.config.websocket.channel, "Starting push transport");

            let (tx, rx) = mpsc::channel(EVENT_BUFFER);
            driver.connect(tx).await?;

            let reporter = Reporter::new(self.config.websocket.callback_url.clone());
            let dispatcher = tokio::spawn(dispatch_events(rx, self.executor(), reporter));
            push = Some((driver, dispatcher));
        } else {
            tracing::info!("Push transport disabled");
        }

        let served = server::serve(listener, state, shutdown).await;

        if let Some((mut driver, dispatcher)) = push {
            driver.disconnect().await;
            if let Err(e) = dispatcher.await {
                tracing::error!(error = %e, "Job dispatcher failed");
            }
        }

        served
    }
}

/// Execute every pushed job as its own task, in arrival order, reporting
/// each outcome. Returns once the driver is gone and all jobs have finished.
pub async fn dispatch_events(
    mut events: mpsc::Receiver<DriverEvent>,
    executor: Arc<JobExecutor>,
    reporter: Reporter,
) {
    let mut jobs = JoinSet::new();

    while let Some(event) = events.recv().await {
        match event {
            DriverEvent::Connected => tracing::info!("Push transport connected"),
            DriverEvent::Disconnected => tracing::warn!("Push transport disconnected"),
            DriverEvent::PrintJob(payload) => {
                let executor = Arc::clone(&executor);
                let reporter = reporter.clone();
                jobs.spawn(async move {
                    let job_id = payload.job_id.clone();
                    let result = executor.execute_payload(payload).await;
                    reporter.report(job_id.as_deref(), &result);
                });
            }
        }

        // Reap finished jobs so the set stays small on long-running agents.
        while jobs.try_join_next().is_some() {}
    }

    while jobs.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebSocketConfig;
    use crate::engine::PrinterInfo;
    use crate::job::JobPayload;

    fn dry_run_config() -> AgentConfig {
        let mut config = AgentConfig {
            listen_ip: "127.0.0.1".into(),
            port: 0,
            ..Default::default()
        };
        config.engine.kind = EngineKind::DryRun;
        config
    }

    #[tokio::test]
    async fn test_dispatch_executes_jobs_and_skips_empty() {
        let engine = MemoryEngine::new();
        let executor = Arc::new(JobExecutor::new(
            Arc::new(engine.clone()),
            ExecutorConfig::default(),
        ));
        let (tx, rx) = mpsc::channel(8);

        tx.send(DriverEvent::Connected).await.unwrap();
        tx.send(DriverEvent::PrintJob(JobPayload {
            job_id: Some("a".into()),
            html: Some("<p>a</p>".into()),
            ..Default::default()
        }))
        .await
        .unwrap();
        tx.send(DriverEvent::PrintJob(JobPayload {
            job_id: Some("empty".into()),
            ..Default::default()
        }))
        .await
        .unwrap();
        drop(tx);

        dispatch_events(rx, executor, Reporter::new(None)).await;

        assert_eq!(engine.print_calls().len(), 1);
        assert_eq!(engine.surfaces_opened(), 1);
    }

    #[tokio::test]
    async fn test_run_fails_when_port_taken() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = dry_run_config();
        config.port = taken.local_addr().unwrap().port();

        let err = Agent::new(config).run(std::future::pending()).await.unwrap_err();

        assert!(err.to_string().contains("already in use"));
    }

    #[tokio::test]
    async fn test_run_with_polling_requires_url() {
        let mut config = dry_run_config();
        config.websocket = WebSocketConfig {
            enabled: true,
            use_polling: true,
            ..Default::default()
        };

        let err = Agent::new(config).run(std::future::pending()).await.unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let agent = Agent::with_engine(
            dry_run_config(),
            Arc::new(MemoryEngine::new().with_printers(vec![PrinterInfo::new("P1")])),
        );
        assert_eq!(agent.executor().printers().await.unwrap()[0].name, "P1");

        let task = tokio::spawn(agent.run(async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();

        task.await.unwrap().unwrap();
    }
}
