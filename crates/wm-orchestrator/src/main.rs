//! webmux Orchestrator Daemon
//!
//! Serves named tmux sessions (local or reachable over SSH) to a browser
//! front end by spawning one ttyd instance per attached session, each
//! running under the requesting user's own identity.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wm_core::config::{self, ServerConfig};
use wm_orchestrator::ipc::IpcServer;
use wm_orchestrator::OrchestratorState;

#[derive(Parser)]
#[command(name = "wm-orchestrator")]
#[command(about = "webmux orchestrator daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// IPC port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        host = %gethostname::gethostname().to_string_lossy(),
        "webmux orchestrator starting..."
    );

    if wm_core::identity::current_euid() != 0 {
        tracing::warn!(
            "Not running as root; only the daemon user's own sessions will be reachable"
        );
    }

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                ServerConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            ServerConfig::default()
        }
    };

    if let Some(port) = args.port {
        config.ipc_port = port;
    }

    match &config.exposure {
        wm_core::config::ExposureConfig::Direct { bind_address } => {
            tracing::info!(bind = %bind_address, "Direct exposure: clients dial terminal ports");
        }
        wm_core::config::ExposureConfig::NginxProxy { rules_dir, .. } => {
            tracing::info!(rules = %rules_dir.display(), "Proxy-fronted exposure via nginx");
        }
    }

    let ipc_address = config.ipc_address();
    let state = Arc::new(OrchestratorState::new(config));

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    // Serve IPC until shutdown
    let server = IpcServer::new(ipc_address, Arc::clone(&state), cancel.clone());
    server.run().await?;

    // Tear down every live terminal through the bounded two-phase stop
    state.terminals.shutdown_all().await;

    tracing::info!("Orchestrator shutdown complete");
    Ok(())
}
