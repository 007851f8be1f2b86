//! # Statemachine Server
//!
//! Runs the gRPC service, the ingress queue subscriber, the event listener
//! and the error publisher until Ctrl+C or SIGTERM.
//!
//! ```bash
//! statemachine-server --config config/statemachine.toml
//! STATEMACHINE__STORE__ENDPOINT=redis://localhost:6379 \
//!     statemachine-server --events-queue fsm_events
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use statemachine::bootstrap::ServiceBootstrap;
use statemachine::config::{ConfigLoader, ServiceConfig, Verbosity};
use statemachine::logging;

#[derive(Parser, Debug)]
#[command(name = "statemachine-server")]
#[command(about = "Networked finite-state-machine execution service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "STATEMACHINE_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// gRPC listen address, e.g. 0.0.0.0:7398
    #[arg(long)]
    bind_address: Option<String>,

    /// Redis URL; empty selects the in-memory store
    #[arg(long)]
    store_endpoint: Option<String>,

    /// pgmq Postgres URL; empty selects in-memory queues
    #[arg(long)]
    queue_endpoint: Option<String>,

    /// Ingress queue name
    #[arg(long)]
    events_queue: Option<String>,

    /// Dead-letter queue for failure outcomes
    #[arg(long)]
    dlq: Option<String>,

    /// Directory holding ca.pem, server.pem and server-key.pem; enables TLS
    #[arg(long)]
    tls_dir: Option<String>,

    /// normal, verbose or trace
    #[arg(short, long)]
    verbosity: Option<Verbosity>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// Release tag reported by Health
    #[arg(long)]
    release: Option<String>,
}

impl Args {
    fn apply(self, mut config: ServiceConfig) -> ServiceConfig {
        if let Some(bind_address) = self.bind_address {
            config.grpc.bind_address = bind_address;
        }
        if let Some(endpoint) = self.store_endpoint {
            config.store.endpoint = endpoint;
        }
        if let Some(endpoint) = self.queue_endpoint {
            config.queues.endpoint = endpoint;
        }
        if let Some(events_queue) = self.events_queue {
            config.queues.events_queue = events_queue;
        }
        if let Some(dlq) = self.dlq {
            config.queues.dlq = dlq;
        }
        if let Some(directory) = self.tls_dir {
            config.grpc.tls.enabled = true;
            config.grpc.tls.directory = directory;
        }
        if let Some(verbosity) = self.verbosity {
            config.logging.verbosity = verbosity;
        }
        if self.json_logs {
            config.logging.json = true;
        }
        if let Some(release) = self.release {
            config.release = release;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_file(path);
    }
    let config = args.apply(loader.load().context("Failed to load configuration")?);
    config.validate().context("Invalid configuration")?;

    logging::init_tracing(&config.logging);

    info!("Starting Statemachine Server...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!("   Release: {}", config.release);
    info!(
        "   Build Mode: {}",
        if cfg!(debug_assertions) {
            "Debug"
        } else {
            "Release"
        }
    );

    let handle = ServiceBootstrap::bootstrap(config)
        .await
        .context("Failed to bootstrap statemachine service")?;

    if let Some(addr) = handle.grpc_addr() {
        info!("   gRPC: {addr}");
    }
    info!("   Press Ctrl+C to shutdown gracefully");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    if let Err(e) = handle.shutdown().await {
        error!("Failed to stop service cleanly: {e}");
        return Err(e.into());
    }

    info!("Statemachine Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
