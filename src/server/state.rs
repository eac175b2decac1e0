//! Server state and configuration.

use std::sync::Arc;

use crate::config::AgentConfig;
use crate::executor::JobExecutor;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:3000")
    pub listen_addr: String,
    /// Port reported by `/health`
    pub port: u16,
    /// Request body limit in megabytes
    pub max_payload_mb: usize,
}

impl From<&AgentConfig> for ServerConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            listen_addr: config.listen_addr(),
            port: config.port,
            max_payload_mb: config.max_payload_mb,
        }
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub config: ServerConfig,
    pub executor: Arc<JobExecutor>,
}

impl AppState {
    pub fn new(config: ServerConfig, executor: Arc<JobExecutor>) -> Self {
        Self { config, executor }
    }
}
