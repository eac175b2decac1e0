//! # Printbridge - Silent Printing Agent and Client
//!
//! Printbridge lets a web application print HTML, web pages and PDFs on a
//! workstation's printers without a print dialog. It provides:
//!
//! - **Intake server**: a small HTTP API (`/print`, `/print-url`,
//!   `/print-pdf`, `/printers`, `/health`)
//! - **Push transports**: Pusher protocol, Socket.IO and HTTP polling, for
//!   servers that cannot reach the workstation directly
//! - **Job executor**: loads content on an isolated surface of a rendering
//!   engine and hands it to the OS print system
//! - **Client library**: typed calls from the application side, with
//!   option profiles and retry
//!
//! ## Quick Start
//!
//! ```no_run
//! use printbridge::{Agent, config::AgentConfig};
//!
//! # async fn demo() -> printbridge::error::Result<()> {
//! let config = AgentConfig::load(&AgentConfig::default_path());
//!
//! Agent::new(config)
//!     .run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | Wires server, executor and push driver together |
//! | [`server`] | HTTP intake API |
//! | [`transport`] | Push drivers and result reporting |
//! | [`executor`] | Job execution on engine surfaces |
//! | [`engine`] | Rendering engine abstraction (Chromium + CUPS, dry run) |
//! | [`client`] | Client for the intake API |
//! | [`config`] | Agent and client configuration |
//! | [`job`] | Job payloads, content sources and results |
//! | [`error`] | Error types |

pub mod agent;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod job;
pub mod server;
pub mod transport;

// Re-exports for convenience
pub use agent::Agent;
pub use client::{OptionsArg, PrintClient};
pub use error::PrintError;
pub use executor::JobExecutor;
pub use job::{PrintJob, PrintResult};
