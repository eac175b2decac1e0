//! # Configuration
//!
//! Two independent configuration surfaces:
//!
//! - [`agent`]: the print agent's persisted JSON file (port, listen address,
//!   engine and push transport settings)
//! - [`client`]: the calling application's settings (service URL, timeouts,
//!   default options and named profiles), read from the environment
//!
//! Both are plain values handed to constructors. Nothing reads configuration
//! from a global.

pub mod agent;
pub mod client;

pub use agent::{AgentConfig, DriverSetting, EngineConfig, EngineKind, SAVED_MESSAGE, WebSocketConfig};
pub use client::{ClientConfig, LoggingConfig, RetryConfig};
