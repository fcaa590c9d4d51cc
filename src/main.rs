//! LAN relay (v1)
//!
//! Exposes a service listening only on loopback to other hosts on the same
//! network segment.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                  LAN RELAY                    │
//!   Client request       │  ┌──────────┐    ┌──────────┐                │
//!   ─────────────────────┼─▶│ listener │───▶│ dispatch │                │
//!                        │  └──────────┘    └────┬─────┘                │
//!                        │          plain ┌──────┴──────┐ upgrade       │
//!                        │                ▼             ▼               │
//!                        │         ┌───────────┐  ┌───────────┐         │
//!                        │         │  forward  │  │ handshake │         │
//!                        │         └─────┬─────┘  └─────┬─────┘         │
//!                        │               │        101   ▼               │
//!                        │               │        ┌───────────┐         │
//!                        │               │        │  splice   │         │
//!                        │               │        └─────┬─────┘         │
//!                        │               ▼              ▼               │
//!                        │         ┌──────────────────────────┐         │
//!                        │         │ connector (fresh conn)   │─────────┼──▶ 127.0.0.1
//!                        │         └──────────────────────────┘         │     backend
//!                        └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use lan_relay::config::{read_config, validate_config, ConfigError, RelayConfig};
use lan_relay::lifecycle::{shutdown_signal, startup, Shutdown};
use lan_relay::observability::logging;
use lan_relay::RelayServer;

#[derive(Parser, Debug)]
#[command(name = "lan-relay")]
#[command(about = "Expose a loopback-only HTTP/WebSocket service on the local network", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network address to listen on (e.g. 192.168.1.20:8080).
    #[arg(short, long)]
    bind: Option<String>,

    /// Backend host (normally a loopback address).
    #[arg(long)]
    backend_host: Option<String>,

    /// Backend port.
    #[arg(long)]
    backend_port: Option<u16>,
}

impl Cli {
    /// Build the effective configuration: file (or defaults), then flags.
    fn into_config(self) -> Result<RelayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => RelayConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(host) = self.backend_host {
            config.backend.host = host;
        }
        if let Some(port) = self.backend_port {
            config.backend.port = port;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability);
    startup::announce(&config);
    startup::start_metrics(&config);

    let listener = match startup::bind_listener(&config).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Failed to bind listener");
            eprintln!("{}", e.diagnostic());
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    if let Err(e) = RelayServer::new(config).run(listener, server_shutdown).await {
        tracing::error!(error = %e, "Relay server failed");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
