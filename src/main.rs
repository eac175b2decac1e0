//! # Printbridge CLI
//!
//! Command-line interface for the print agent.
//!
//! ## Usage
//!
//! ```bash
//! # Run the agent with the saved configuration
//! printbridge serve
//!
//! # Override the port, render nothing (log only)
//! printbridge serve --port 3100 --dry-run
//!
//! # Inspect and change the saved configuration
//! printbridge config show
//! printbridge config set port=3100 websocket.enabled=true websocket.channel=printing
//!
//! # Talk to a running agent (PRINT_SERVICE_URL, default http://localhost:3000)
//! printbridge health
//! printbridge printers
//! printbridge test --printer Office --type url --url https://example.com
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use serde_json::Value;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use printbridge::{
    Agent, OptionsArg, PrintClient, PrintError,
    config::{AgentConfig, ClientConfig, EngineKind, SAVED_MESSAGE},
};

/// Printbridge - silent printing agent
#[derive(Parser, Debug)]
#[command(name = "printbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the print agent
    Serve {
        /// Configuration file (defaults to the per-user config path)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Intake port
        #[arg(long)]
        port: Option<u16>,

        /// Interface to bind
        #[arg(long)]
        listen_ip: Option<String>,

        /// Log jobs instead of printing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show or change the saved configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,

        /// Configuration file (defaults to the per-user config path)
        #[arg(long, global = true, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// List printers known to a running agent
    Printers,

    /// Check that a running agent answers
    Health,

    /// Send a test print to a running agent
    Test {
        /// Target printer (defaults to PRINT_DEFAULT_PRINTER or the OS default)
        #[arg(long)]
        printer: Option<String>,

        /// What to print
        #[arg(long = "type", value_enum, default_value_t = TestKind::Html)]
        kind: TestKind,

        /// Page or PDF address for `--type url` and `--type pdf`
        #[arg(long)]
        url: Option<String>,

        /// Options profile to apply
        #[arg(long)]
        profile: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,
    /// Set values, e.g. `port=3100` or `websocket.enabled=true`
    Set {
        #[arg(value_name = "KEY=VALUE", required = true)]
        values: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TestKind {
    Html,
    Url,
    Pdf,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "printbridge=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), PrintError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            listen_ip,
            dry_run,
        } => {
            let path = config.unwrap_or_else(AgentConfig::default_path);
            let mut config = AgentConfig::load(&path);
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(listen_ip) = listen_ip {
                config.listen_ip = listen_ip;
            }
            if dry_run {
                config.engine.kind = EngineKind::DryRun;
            }

            Agent::new(config).run(shutdown_signal()).await?;
        }

        Commands::Config { action, config } => {
            let path = config.unwrap_or_else(AgentConfig::default_path);
            let current = AgentConfig::load(&path);
            match action {
                ConfigAction::Show => {
                    println!("{}", serde_json::to_string_pretty(&current)?);
                }
                ConfigAction::Set { values } => {
                    let patch = build_patch(&current, &values)?;
                    current.save(&path, &patch)?;
                    println!("{}", SAVED_MESSAGE);
                }
            }
        }

        Commands::Printers => {
            let client = PrintClient::new(ClientConfig::from_env())?;
            let printers = client.printers().await;
            if printers.is_empty() {
                println!("No printers found (is the agent running?)");
            }
            for printer in printers {
                let marker = if printer.is_default { "*" } else { " " };
                println!("{} {:<32} {}", marker, printer.name, printer.display_name);
            }
        }

        Commands::Health => {
            let config = ClientConfig::from_env();
            let url = config.service_url.clone();
            let client = PrintClient::new(config)?;
            if client.is_healthy().await {
                println!("Print service at {} is running", url);
            } else {
                return Err(PrintError::Transport(format!(
                    "Print service at {} is not reachable",
                    url
                )));
            }
        }

        Commands::Test {
            printer,
            kind,
            url,
            profile,
        } => {
            let client = PrintClient::new(ClientConfig::from_env())?;
            let options = profile.map(OptionsArg::Profile).unwrap_or_default();
            let printer = printer.as_deref();

            let result = match kind {
                TestKind::Html => client.print_html(&test_page(), printer, options).await,
                TestKind::Url => {
                    let url = url.ok_or_else(|| {
                        PrintError::Validation("--url is required for --type url".to_string())
                    })?;
                    client.print_url(&url, printer, options).await
                }
                TestKind::Pdf => {
                    let url = url.ok_or_else(|| {
                        PrintError::Validation("--url is required for --type pdf".to_string())
                    })?;
                    client.print_pdf_url(&url, printer, options).await
                }
            };

            if !result.success {
                return Err(PrintError::Execution(result.message));
            }
            println!("{}", result.message);
        }
    }

    Ok(())
}

/// Turn `KEY=VALUE` arguments into a top-level config patch.
///
/// Values are parsed as JSON when possible (`true`, `3100`, `{"a":1}`),
/// otherwise taken as strings. Dotted keys update one field of a nested
/// section and keep its siblings.
fn build_patch(current: &AgentConfig, values: &[String]) -> Result<Value, PrintError> {
    let mut config = serde_json::to_value(current)?;

    for pair in values {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            PrintError::Validation(format!("expected KEY=VALUE, got '{}'", pair))
        })?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        let (sections, field) = match key.rsplit_once('.') {
            Some((sections, field)) => (sections.split('.').collect::<Vec<_>>(), field),
            None => (Vec::new(), key),
        };

        let mut target = &mut config;
        for section in sections {
            target = target
                .as_object_mut()
                .ok_or_else(|| PrintError::Validation(format!("'{}' is not a section", key)))?
                .entry(section.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
        }
        target
            .as_object_mut()
            .ok_or_else(|| PrintError::Validation(format!("'{}' is not a section", key)))?
            .insert(field.to_string(), value);
    }

    Ok(config)
}

fn test_page() -> String {
    format!(
        "<!DOCTYPE html><html><body style=\"font-family: sans-serif\">\
         <h1>Printbridge test page</h1>\
         <p>Job {}</p><p>Sent {}</p>\
         </body></html>",
        uuid::Uuid::new_v4(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_build_patch_nested_keeps_siblings() {
        let current = AgentConfig::default();

        let patch = build_patch(
            &current,
            &args(&["port=3100", "websocket.enabled=true", "websocket.channel=office"]),
        )
        .unwrap();
        let updated = current.merged(&patch).unwrap();

        assert_eq!(updated.port, 3100);
        assert!(updated.websocket.enabled);
        assert_eq!(updated.websocket.channel, "office");
        assert_eq!(updated.websocket.polling_interval, 2000);
    }

    #[test]
    fn test_build_patch_rejects_missing_equals() {
        assert!(build_patch(&AgentConfig::default(), &args(&["port"])).is_err());
    }

    #[test]
    fn test_build_patch_rejects_field_as_section() {
        assert!(build_patch(&AgentConfig::default(), &args(&["port.value=1"])).is_err());
    }
}
